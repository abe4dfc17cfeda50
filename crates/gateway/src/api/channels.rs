//! Activated-channel routes (spec §6): list, and the strict-schema merge of
//! per-channel config overrides where a present-but-null field clears the
//! override and an absent field leaves it untouched (spec §8 boundary
//! behavior).

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use relay_domain::types::{ActivatedChannel, ChannelSettings, LlmConfigOverride};

use crate::api::response::ApiError;
use crate::state::AppState;

const CHANNEL_LIST_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListChannelsQuery {
    pub guild_id: String,
}

fn channel_to_json(channel: &ActivatedChannel) -> serde_json::Value {
    serde_json::json!({
        "channelId": channel.channel_id,
        "guildId": channel.guild_id,
        "creatorId": channel.creator_id,
        "settings": {
            "activatedPersonality": channel.settings.activated_personality,
            "personaOverride": channel.settings.persona_override,
            "llmConfigOverride": channel.settings.llm_config_override,
        },
    })
}

pub async fn list_channels(
    State(state): State<AppState>,
    Query(query): Query<ListChannelsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut channels = state.channels.list_for_guild(&query.guild_id).await?;
    channels.truncate(CHANNEL_LIST_LIMIT);
    Ok(Json(serde_json::json!({
        "channels": channels.iter().map(channel_to_json).collect::<Vec<_>>(),
    })))
}

/// Merges a single optional field: key absent in the patch leaves `current`
/// untouched, key present with `null` clears it, key present with a value
/// parses and replaces it.
fn merge_field<T: serde::de::DeserializeOwned>(
    patch: &serde_json::Map<String, serde_json::Value>,
    key: &str,
    current: Option<T>,
) -> Result<Option<T>, ApiError> {
    match patch.get(key) {
        None => Ok(current),
        Some(serde_json::Value::Null) => Ok(None),
        Some(value) => {
            serde_json::from_value(value.clone()).map(Some).map_err(|e| ApiError::validation(format!("{key}: {e}")))
        }
    }
}

pub async fn patch_config_overrides(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Json(patch): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let patch = patch.as_object().cloned().unwrap_or_default();
    let existing = state.channels.get(&channel_id).await?;
    let (guild_id, creator_id, current) = match &existing {
        Some(channel) => (channel.guild_id.clone(), channel.creator_id, channel.settings.clone()),
        None => return Err(ApiError::not_found(format!("channel {channel_id} is not activated"))),
    };

    let settings = ChannelSettings {
        activated_personality: merge_field::<Uuid>(&patch, "activatedPersonality", current.activated_personality)?,
        persona_override: merge_field::<Uuid>(&patch, "personaOverride", current.persona_override)?,
        llm_config_override: merge_field::<LlmConfigOverride>(&patch, "llmConfigOverride", current.llm_config_override)?,
    };

    let channel = ActivatedChannel { channel_id, guild_id, settings, creator_id };
    state.channels.upsert(&channel).await?;
    state
        .invalidation
        .publish(&state.kv, relay_cache::InvalidationEvent::Channel { id_hash: hash_channel_id(&channel.channel_id) })
        .await?;
    Ok(Json(channel_to_json(&channel)))
}

pub async fn delete_config_overrides(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let existing = state.channels.get(&channel_id).await?.ok_or_else(|| ApiError::not_found(format!("channel {channel_id} is not activated")))?;
    let channel = ActivatedChannel { channel_id: channel_id.clone(), guild_id: existing.guild_id, settings: ChannelSettings::default(), creator_id: existing.creator_id };
    state.channels.upsert(&channel).await?;
    state
        .invalidation
        .publish(&state.kv, relay_cache::InvalidationEvent::Channel { id_hash: hash_channel_id(&channel_id) })
        .await?;
    Ok(Json(channel_to_json(&channel)))
}

fn hash_channel_id(channel_id: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    channel_id.hash(&mut hasher);
    hasher.finish()
}
