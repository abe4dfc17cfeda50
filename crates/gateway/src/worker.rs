//! `LlmGeneration` job handler: the seam between the durable queue
//! (`relay-queue`) and the Generation Pipeline (`relay-pipeline`).
//!
//! Grounded on the teacher's dynamic job-type dispatch in
//! `crates/gateway/src/runtime/agent.rs` (look up everything the handler
//! needs by id, then call into the shared orchestrator) — generalized here
//! into one `JobHandler` impl per `relay_domain::types::JobType`, per the
//! typed-registry redesign flag (spec §9).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use relay_domain::types::{HistoryMessage, Persona, ReasoningOptions, ReferencedMessage};
use relay_pipeline::{run_generation, GenerationDeps, GenerationOutcome, GenerationRequest};

use crate::state::AppState;

/// Wire shape of an `LlmGeneration` job payload, matching the fields
/// `submitGenerate` accepts (spec §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateJobPayload {
    pub user_id: Uuid,
    pub personality_id: Uuid,
    pub channel_id: Option<String>,
    pub guild_id: Option<String>,
    pub session_id: Option<String>,
    pub message_text: String,
    #[serde(default)]
    pub raw_history: Vec<HistoryMessage>,
    #[serde(default)]
    pub referenced: Vec<ReferencedMessage>,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
    #[serde(default)]
    pub reasoning: Option<ReasoningOptions>,
    pub user_display_name: String,
    #[serde(default)]
    pub user_handle: Option<String>,
}

/// The provider this deployment speaks to; the BYOK credential lookup is
/// keyed by this service tag (spec §3 `UserCredential.service`).
const CREDENTIAL_SERVICE: &str = "openrouter";

pub struct GenerationJobHandler {
    pub state: AppState,
}

#[async_trait::async_trait]
impl relay_queue::JobHandler for GenerationJobHandler {
    async fn handle(&self, payload: serde_json::Value, cancel: CancellationToken) -> Result<serde_json::Value, String> {
        let job_id = payload
            .get("jobId")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<Uuid>().ok())
            .unwrap_or_else(Uuid::new_v4);
        let payload: GenerateJobPayload = serde_json::from_value(payload).map_err(|e| format!("bad job payload: {e}"))?;

        let outcome = self.run(job_id, payload, cancel).await.map_err(|e| e.to_string())?;

        Ok(serde_json::json!({
            "content": outcome.content,
            "reasoning": outcome.reasoning,
            "isDuplicate": outcome.is_duplicate,
            "isGuestMode": outcome.is_guest_mode,
        }))
    }
}

impl GenerationJobHandler {
    async fn run(
        &self,
        job_id: Uuid,
        payload: GenerateJobPayload,
        _cancel: CancellationToken,
    ) -> relay_domain::Result<GenerationOutcome> {
        let personality = self
            .state
            .personalities
            .get(payload.personality_id)
            .await?
            .ok_or_else(|| relay_domain::Error::Other(format!("unknown personality {}", payload.personality_id)))?;

        let user_personality_config = self
            .state
            .user_personality_configs
            .get(payload.user_id, payload.personality_id)
            .await?;

        let channel_settings = match &payload.channel_id {
            Some(channel_id) => self.state.channels.get(channel_id).await?.map(|c| c.settings),
            None => None,
        };

        let credential = self
            .state
            .credentials
            .get(payload.user_id, CREDENTIAL_SERVICE)
            .await?;

        let persona_rows = self.state.personas.list_for_user(payload.user_id).await?;
        // No persisted per-personality persona-link table exists; the
        // user's first owned persona stands in as their default, same as
        // `PersonaResolver::resolve` falls back to `default_personas` when
        // no explicit link or channel override applies.
        let default_persona_id = persona_rows.first().map(|p| p.id);
        let personas: HashMap<Uuid, Persona> = persona_rows.into_iter().map(|p| (p.id, p)).collect();
        let persona_resolver = match default_persona_id {
            Some(id) => relay_sessions::PersonaResolver::from_links(&[], &[(payload.user_id, id)]),
            None => relay_sessions::PersonaResolver::new(),
        };

        let request = GenerationRequest {
            job_id,
            user_id: payload.user_id,
            channel_id: payload.channel_id,
            guild_id: payload.guild_id,
            session_id: payload.session_id,
            message_text: payload.message_text,
            raw_history: payload.raw_history,
            referenced: payload.referenced,
            requested_personality: personality,
            user_personality_config,
            channel_settings,
            personas,
            credential,
            stop_sequences: payload.stop_sequences,
            reasoning: payload.reasoning,
            user_display_name: payload.user_display_name,
            user_handle: payload.user_handle,
        };

        let deps = GenerationDeps {
            persona_resolver: &persona_resolver,
            encryption_key: self.state.encryption_key.as_deref(),
            guest_api_key: &self.state.guest_api_key,
            guest_db_free_default_model: None,
            memory_store: self.state.memory_store.as_ref(),
            embedder: self.state.embedder.as_ref(),
            llm: self.state.llm.as_ref(),
            kv: &self.state.kv,
            delivery_store: self.state.deliveries.as_ref(),
            completion_reserve: 512,
            memory_limit: 10,
            memory_score_threshold: 0.75,
            memory_channel_budget_ratio: 0.3,
        };

        run_generation(request, deps).await
    }
}
