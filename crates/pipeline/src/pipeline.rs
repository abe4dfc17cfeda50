//! The Generation Pipeline orchestrator (spec §4.3): runs the twelve
//! stages, in order, over one generation request.
//!
//! Grounded in spirit on the teacher's `run_turn`/`TurnContext` phased
//! orchestration (`crates/gateway/src/runtime/turn.rs`), simplified to
//! match this pipeline's shape: stages are strictly sequential (§5), there
//! is no SSE event stream and no tool-calling loop, so there is no
//! `TurnEvent` enum or cancellation-aware run-store bookkeeping — just one
//! `tracing::info_span!` per stage and a `Result` return.

use std::collections::HashMap;
use std::time::Instant;

use uuid::Uuid;

use relay_cache::Kv;
use relay_context::{ContextPackBuilder, ContextReport, PlaceholderNames};
use relay_domain::crypto::EncryptionKey;
use relay_domain::error::{Error, Result};
use relay_domain::types::{
    ChannelSettings, DeliveryState, HistoryMessage, JobResult, Persona, Personality, ReasoningOptions,
    ReferencedMessage, UserCredential, UserPersonalityConfig,
};
use relay_memory::{persist, retrieve, ChannelScope, Embedder, MemoryStore, PersistenceRequest, RetrievalRequest};
use relay_providers::auth::{resolve_auth, GuestModeKey};
use relay_providers::traits::{ChatMessage, ChatRequest, LlmProvider};
use relay_sessions::{normalize_history, resolve_config, ConfigSource, PersonaResolver};

use crate::delivery::{self, PgDeliveryStore};
use crate::postprocess::post_process;
use crate::telemetry::{self, StopSequenceCheck};

pub struct GenerationRequest {
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub channel_id: Option<String>,
    pub guild_id: Option<String>,
    pub session_id: Option<String>,
    pub message_text: String,
    pub raw_history: Vec<HistoryMessage>,
    pub referenced: Vec<ReferencedMessage>,
    pub requested_personality: Personality,
    pub user_personality_config: Option<UserPersonalityConfig>,
    pub channel_settings: Option<ChannelSettings>,
    pub personas: HashMap<Uuid, Persona>,
    pub credential: Option<UserCredential>,
    pub stop_sequences: Vec<String>,
    pub reasoning: Option<ReasoningOptions>,
    pub user_display_name: String,
    pub user_handle: Option<String>,
}

pub struct GenerationDeps<'a> {
    pub persona_resolver: &'a PersonaResolver,
    pub encryption_key: Option<&'a EncryptionKey>,
    pub guest_api_key: &'a str,
    pub guest_db_free_default_model: Option<&'a str>,
    pub memory_store: &'a dyn MemoryStore,
    pub embedder: &'a dyn Embedder,
    pub llm: &'a dyn LlmProvider,
    pub kv: &'a Kv,
    pub delivery_store: &'a PgDeliveryStore,
    pub completion_reserve: u32,
    pub memory_limit: u32,
    pub memory_score_threshold: f64,
    pub memory_channel_budget_ratio: f64,
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub content: String,
    pub reasoning: Option<String>,
    pub is_duplicate: bool,
    pub is_guest_mode: bool,
    pub config_source: ConfigSource,
    pub context_report: ContextReport,
}

/// Builds the final message list handed to the provider: the system
/// prompt, the (already budgeted) history window, then the final user
/// turn — which token budgeting never drops (spec §8).
fn build_chat_messages(system_prompt: &str, budgeted_history: Vec<ChatMessage>, final_user_turn: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(budgeted_history.len() + 2);
    messages.push(ChatMessage { role: "system".into(), content: system_prompt.to_string() });
    messages.extend(budgeted_history);
    messages.push(ChatMessage { role: "user".into(), content: final_user_turn.to_string() });
    messages
}

fn verbose_prompt_logging_enabled() -> bool {
    std::env::var("NODE_ENV").as_deref() == Ok("development")
}

pub async fn run_generation(request: GenerationRequest, deps: GenerationDeps<'_>) -> Result<GenerationOutcome> {
    let stage1 = Instant::now();
    let history = normalize_history(&request.raw_history);
    tracing::debug!(elapsed_ms = stage1.elapsed().as_millis(), "stage 1: normalization");

    let stage2 = Instant::now();
    let resolved = resolve_config(
        &request.requested_personality,
        request.user_personality_config.as_ref(),
        request.channel_settings.as_ref(),
    );
    let persona_id = resolved
        .persona_override
        .or_else(|| deps.persona_resolver.resolve(request.user_id, resolved.effective_personality.id, &request.personas))
        .ok_or_else(|| Error::Other("no persona resolved for this request".into()))?;
    let persona = request
        .personas
        .get(&persona_id)
        .cloned()
        .ok_or_else(|| Error::Other(format!("resolved persona {persona_id} not found in candidate set")))?;
    tracing::debug!(
        elapsed_ms = stage2.elapsed().as_millis(),
        config_source = ?resolved.config_source,
        persona_id = %persona_id,
        "stage 2: config + persona resolution"
    );

    let stage3 = Instant::now();
    let auth = resolve_auth(
        request.credential.as_ref(),
        deps.encryption_key,
        &resolved.effective_personality,
        GuestModeKey { api_key: deps.guest_api_key, db_free_default_model: deps.guest_db_free_default_model },
    );
    tracing::debug!(elapsed_ms = stage3.elapsed().as_millis(), guest_mode = auth.is_guest_mode, "stage 3: auth resolution");

    let stage4 = Instant::now();
    let exclude_newer_than = relay_context::oldest_timestamp(&history, &request.referenced);
    tracing::debug!(elapsed_ms = stage4.elapsed().as_millis(), "stage 4: context preparation");

    let stage5 = Instant::now();
    let retrieval_request = RetrievalRequest {
        query_text: request.message_text.clone(),
        persona_id,
        personality_id: Some(resolved.effective_personality.id),
        score_threshold: deps.memory_score_threshold,
        exclude_newer_than,
        limit: deps.memory_limit,
        channel_scope: request
            .channel_id
            .clone()
            .map(|channel_id| ChannelScope { channel_id, budget_ratio: deps.memory_channel_budget_ratio }),
    };
    let memories = retrieve(deps.memory_store, deps.embedder, &retrieval_request).await?;
    tracing::debug!(elapsed_ms = stage5.elapsed().as_millis(), memory_count = memories.len(), "stage 5: memory retrieval");

    let stage67 = Instant::now();
    let assistant_display_name = persona.preferred_name.clone().unwrap_or_else(|| persona.name.clone());
    let names = PlaceholderNames {
        user_display_name: request.user_display_name.clone(),
        user_handle: request.user_handle.clone(),
        assistant_display_name: assistant_display_name.clone(),
    };
    let builder = ContextPackBuilder::new(deps.completion_reserve);
    let (budgeted, system_prompt, context_report) = builder.build(
        &persona,
        &resolved.effective_personality,
        &history,
        &request.referenced,
        &memories,
        &names,
        &request.message_text,
    );
    if verbose_prompt_logging_enabled() {
        tracing::debug!(%system_prompt, "assembled system prompt");
    }
    tracing::debug!(
        elapsed_ms = stage67.elapsed().as_millis(),
        history_dropped = context_report.dropped.history_messages_dropped,
        memories_dropped = context_report.dropped.memories_dropped,
        "stage 6+7: prompt assembly + token budgeting"
    );

    let stage8 = Instant::now();
    let chat_request = ChatRequest {
        messages: build_chat_messages(&system_prompt, budgeted.history, &request.message_text),
        model: auth.effective_model,
        temperature: Some(resolved.effective_personality.temperature),
        max_tokens: Some(resolved.effective_personality.max_tokens),
        stop_sequences: request.stop_sequences.clone(),
        reasoning: request.reasoning.clone(),
    };
    let response = deps.llm.chat(chat_request, &auth.api_key).await?;
    tracing::debug!(elapsed_ms = stage8.elapsed().as_millis(), model = %response.model, "stage 8: LLM invocation");

    let stage9 = Instant::now();
    let post = post_process(&response.content, &assistant_display_name, &history);
    tracing::debug!(elapsed_ms = stage9.elapsed().as_millis(), is_duplicate = post.is_duplicate, "stage 9: post-processing");

    let stop_check = StopSequenceCheck {
        configured_stop_sequences: &request.stop_sequences,
        provider_finish_reason: response.finish_reason.as_deref(),
        raw_content: &response.content,
    };
    if telemetry::is_inferred_stop_sequence(&stop_check) {
        telemetry::record_activation(deps.kv, &resolved.effective_personality.id.to_string()).await;
    }

    let stage11 = Instant::now();
    let persistence_request = PersistenceRequest {
        persona_id,
        personality_id: Some(resolved.effective_personality.id),
        message_text: request.message_text.clone(),
        referenced_content: request.referenced.last().map(|r| r.content.clone()),
        session_id: request.session_id.clone(),
        channel_id: request.channel_id.clone(),
        guild_id: request.guild_id.clone(),
        sender_ids: vec![request.user_id.to_string()],
    };
    persist(deps.memory_store, deps.embedder, &persistence_request).await;
    tracing::debug!(elapsed_ms = stage11.elapsed().as_millis(), "stage 11: memory persistence");

    let stage12 = Instant::now();
    let job_result = JobResult {
        job_id: request.job_id,
        payload: serde_json::json!({
            "content": post.content.clone(),
            "reasoning": post.reasoning.clone(),
            "isDuplicate": post.is_duplicate,
        }),
        delivery_state: DeliveryState::PendingDelivery,
    };
    delivery::hand_off(deps.kv, deps.delivery_store, &job_result).await?;
    tracing::debug!(elapsed_ms = stage12.elapsed().as_millis(), "stage 12: delivery hand-off");

    Ok(GenerationOutcome {
        content: post.content,
        reasoning: post.reasoning,
        is_duplicate: post.is_duplicate,
        is_guest_mode: auth.is_guest_mode,
        config_source: resolved.config_source,
        context_report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(content: &str) -> ChatMessage {
        ChatMessage { role: "user".into(), content: content.into() }
    }

    #[test]
    fn chat_messages_are_system_then_history_then_final_turn() {
        let messages = build_chat_messages("sys prompt", vec![msg("earlier turn")], "final turn");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, "sys prompt");
        assert_eq!(messages[1].content, "earlier turn");
        assert_eq!(messages[2].role, "user");
        assert_eq!(messages[2].content, "final turn");
    }

    #[test]
    fn empty_history_still_carries_system_and_final_turn() {
        let messages = build_chat_messages("sys", vec![], "hi");
        assert_eq!(messages.len(), 2);
    }
}
