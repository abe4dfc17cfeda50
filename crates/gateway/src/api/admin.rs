//! Denylist CRUD and stop-sequence telemetry (spec §6, §3, §9).

use axum::extract::{Path, State};
use axum::Json;
use redis::AsyncCommands;
use serde::Deserialize;
use uuid::Uuid;

use relay_cache::InvalidationEvent;
use relay_domain::types::{DenylistEntry, DenylistScope, DenylistTargetType};

use crate::api::response::{ApiError, SuccessEnvelope};
use crate::state::AppState;

fn entry_to_json(entry: &DenylistEntry) -> serde_json::Value {
    serde_json::json!({
        "targetType": entry.target_type,
        "discordId": entry.discord_id,
        "scope": entry.scope,
        "scopeId": entry.scope_id,
        "reason": entry.reason,
        "addedBy": entry.added_by,
    })
}

pub async fn list_denylist(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let entries = state.denylist.list().await?;
    Ok(Json(serde_json::json!({ "entries": entries.iter().map(entry_to_json).collect::<Vec<_>>() })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDenylistEntryRequest {
    pub target_type: DenylistTargetType,
    pub discord_id: String,
    pub scope: DenylistScope,
    pub scope_id: String,
    pub reason: String,
    pub added_by: Uuid,
}

pub async fn add_denylist_entry(
    State(state): State<AppState>,
    Json(request): Json<AddDenylistEntryRequest>,
) -> Result<SuccessEnvelope, ApiError> {
    let entry = DenylistEntry::new(
        request.target_type,
        request.discord_id,
        request.scope,
        request.scope_id,
        request.reason,
        request.added_by,
    )
    .map_err(|e| ApiError::validation(e.to_string()))?;

    state.denylist.add(&entry).await?;
    state
        .invalidation
        .publish(&state.kv, InvalidationEvent::Denylist(relay_cache::bus::DenylistOp::Add))
        .await?;
    Ok(SuccessEnvelope { job_id: None, request_id: None, status: "added".into() })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveDenylistEntryQuery {
    pub scope: DenylistScope,
    pub scope_id: String,
}

pub async fn remove_denylist_entry(
    State(state): State<AppState>,
    Path(discord_id): Path<String>,
    axum::extract::Query(query): axum::extract::Query<RemoveDenylistEntryQuery>,
) -> Result<SuccessEnvelope, ApiError> {
    state.denylist.remove(&discord_id, query.scope, &query.scope_id).await?;
    state
        .invalidation
        .publish(&state.kv, InvalidationEvent::Denylist(relay_cache::bus::DenylistOp::Remove))
        .await?;
    Ok(SuccessEnvelope { job_id: None, request_id: None, status: "removed".into() })
}

pub async fn stop_sequence_telemetry(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let mut conn = state.kv.raw();
    let counts: std::collections::HashMap<String, i64> = conn
        .hgetall(relay_pipeline::TELEMETRY_HASH_KEY)
        .await
        .map_err(|e| ApiError::from(relay_domain::Error::Other(format!("telemetry scan failed: {e}"))))?;
    let total: i64 = counts.values().sum();
    Ok(Json(serde_json::json!({ "total": total, "byPersonality": counts })))
}
