//! Core data model (spec §3): the entities every other crate in the
//! workspace passes around. Kept free of persistence concerns — `sqlx`
//! row-mapping lives alongside the stores that own each table, not here.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A platform user. The external id is the chat-platform snowflake; the
/// internal UUID is what every other table references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub external_id: String,
    pub default_persona_handle: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub preferred_name: Option<String>,
    pub pronouns: Option<String>,
    pub description: Option<String>,
    pub share_ltm_across_personalities: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Personality {
    pub id: Uuid,
    pub slug: String,
    pub display_name: String,
    /// Either a literal prompt string or a structured block; callers decide
    /// which by inspecting `SystemPromptTemplate`.
    pub system_prompt_template: SystemPromptTemplate,
    pub model: String,
    pub vision_model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub context_window: u32,
    pub visibility: Visibility,
    pub owner_id: Uuid,
    pub co_owner_ids: Vec<Uuid>,
    pub avatar_blob: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SystemPromptTemplate {
    Literal { text: String },
    Structured {
        permissions: Vec<String>,
        character_directives: Vec<String>,
        formatting_rules: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    ApiKey,
    OAuthToken,
}

/// Ciphertext is AES-256-GCM; see `crate::crypto`. The plaintext never
/// appears in this type nor in any `Debug`/log output it might flow through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCredential {
    pub owner_id: Uuid,
    pub service: String,
    pub credential_type: CredentialType,
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
    pub auth_tag: Vec<u8>,
    /// Spec §4.3 stage 3 requires BYOK resolution to treat an expired
    /// credential as absent; `None` means the credential never expires.
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl UserCredential {
    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfigOverride {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stop_sequences: Option<Vec<String>>,
}

/// Composite-keyed override row; per spec §3, delete the row once both
/// overrides are null rather than persisting an all-empty record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPersonalityConfig {
    pub user_id: Uuid,
    pub personality_id: Uuid,
    pub persona_override: Option<Uuid>,
    pub llm_config_override: Option<LlmConfigOverride>,
}

impl UserPersonalityConfig {
    pub fn is_empty(&self) -> bool {
        self.persona_override.is_none() && self.llm_config_override.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stop_sequences: Vec<String>,
    pub reasoning: Option<ReasoningOptions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningOptions {
    pub enabled: bool,
    pub effort: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DenylistTargetType {
    User,
    Guild,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DenylistScope {
    Bot,
    Guild,
    Channel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenylistEntry {
    pub target_type: DenylistTargetType,
    pub discord_id: String,
    pub scope: DenylistScope,
    pub scope_id: String,
    pub reason: String,
    pub added_by: Uuid,
}

/// Invariant errors for `DenylistEntry` construction (spec §3 / §8 boundary
/// behaviors): `type=GUILD ⇒ scope=BOT`; `scope=BOT ⇔ scopeId="*"`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DenylistInvariantError {
    #[error("type=GUILD entries must have scope=BOT")]
    GuildRequiresBotScope,
    #[error("scope=BOT requires scopeId=\"*\"")]
    BotScopeRequiresWildcardId,
    #[error("scopeId=\"*\" is only valid for scope=BOT")]
    WildcardIdRequiresBotScope,
}

impl DenylistEntry {
    pub fn new(
        target_type: DenylistTargetType,
        discord_id: String,
        scope: DenylistScope,
        scope_id: String,
        reason: String,
        added_by: Uuid,
    ) -> Result<Self, DenylistInvariantError> {
        if target_type == DenylistTargetType::Guild && scope != DenylistScope::Bot {
            return Err(DenylistInvariantError::GuildRequiresBotScope);
        }
        match (scope, scope_id.as_str()) {
            (DenylistScope::Bot, "*") => {}
            (DenylistScope::Bot, _) => return Err(DenylistInvariantError::BotScopeRequiresWildcardId),
            (_, "*") => return Err(DenylistInvariantError::WildcardIdRequiresBotScope),
            _ => {}
        }
        Ok(Self {
            target_type,
            discord_id,
            scope,
            scope_id,
            reason,
            added_by,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub activated_personality: Option<Uuid>,
    pub persona_override: Option<Uuid>,
    pub llm_config_override: Option<LlmConfigOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivatedChannel {
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub settings: ChannelSettings,
    pub creator_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Active,
    Delayed,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    LlmGeneration,
    AudioTranscription,
    ImageDescription,
    Cleanup,
    MemoryBackfill,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub state: JobState,
    pub attempt: u32,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub dependencies: Vec<Uuid>,
}

impl Job {
    pub fn new(id: Uuid, job_type: JobType, payload: serde_json::Value) -> Self {
        Self {
            id,
            job_type,
            payload,
            state: JobState::Queued,
            attempt: 0,
            result: None,
            error: None,
            dependencies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryState {
    PendingDelivery,
    Delivered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub payload: serde_json::Value,
    pub delivery_state: DeliveryState,
}

impl JobResult {
    /// §3 invariant: transitions only PENDING_DELIVERY → DELIVERED;
    /// idempotent — repeated confirmation is a successful no-op (§8 E6,
    /// spec §9 open question resolved in DESIGN.md: already-DELIVERED is a
    /// success, not an error).
    pub fn confirm_delivery(&mut self) {
        self.delivery_state = DeliveryState::Delivered;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryScope {
    Global,
    Personal,
    Session,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: Uuid,
    pub text: String,
    pub embedding: Vec<f32>,
    pub scope: MemoryScope,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub provenance: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingMemory {
    pub id: Uuid,
    pub text: String,
    pub embedding: Vec<f32>,
    pub scope: MemoryScope,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub provenance: serde_json::Value,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl From<&PendingMemory> for Memory {
    fn from(p: &PendingMemory) -> Self {
        Memory {
            id: p.id,
            text: p.text.clone(),
            embedding: p.embedding.clone(),
            scope: p.scope,
            created_at: p.created_at,
            provenance: p.provenance.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationHistoryTombstone {
    pub message_id: String,
    pub deleted_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeduplicationEntry {
    pub fingerprint: String,
    pub job_id: Uuid,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// A single turn of conversation history as it arrives at the pipeline,
/// before stage 1 normalization. `role` and `timestamp` are intentionally
/// loosely typed (`Value`) because legacy callers send inconsistent casing
/// for roles and a mix of epoch-millis numbers and date strings for
/// timestamps; normalization canonicalizes both in place. Not named in the
/// §3 entity table (it is wire/job-payload shape, not a persisted entity)
/// but required by every stage from Normalization through Prompt Assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
    pub timestamp: serde_json::Value,
    pub persona_id: Option<Uuid>,
    pub referenced: Option<ReferencedMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencedMessage {
    pub content: String,
    pub timestamp: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denylist_guild_requires_bot_scope() {
        let err = DenylistEntry::new(
            DenylistTargetType::Guild,
            "1".into(),
            DenylistScope::Guild,
            "1".into(),
            "spam".into(),
            Uuid::nil(),
        )
        .unwrap_err();
        assert_eq!(err, DenylistInvariantError::GuildRequiresBotScope);
    }

    #[test]
    fn denylist_bot_scope_requires_wildcard() {
        let err = DenylistEntry::new(
            DenylistTargetType::User,
            "1".into(),
            DenylistScope::Bot,
            "123".into(),
            "spam".into(),
            Uuid::nil(),
        )
        .unwrap_err();
        assert_eq!(err, DenylistInvariantError::BotScopeRequiresWildcardId);
    }

    #[test]
    fn denylist_valid_bot_entry() {
        let entry = DenylistEntry::new(
            DenylistTargetType::User,
            "1".into(),
            DenylistScope::Bot,
            "*".into(),
            "spam".into(),
            Uuid::nil(),
        )
        .unwrap();
        assert_eq!(entry.scope_id, "*");
    }

    #[test]
    fn denylist_valid_channel_entry() {
        let entry = DenylistEntry::new(
            DenylistTargetType::User,
            "1".into(),
            DenylistScope::Channel,
            "42".into(),
            "spam".into(),
            Uuid::nil(),
        )
        .unwrap();
        assert_eq!(entry.scope, DenylistScope::Channel);
    }

    #[test]
    fn empty_config_detects_both_overrides_null() {
        let cfg = UserPersonalityConfig {
            user_id: Uuid::nil(),
            personality_id: Uuid::nil(),
            persona_override: None,
            llm_config_override: None,
        };
        assert!(cfg.is_empty());
    }

    #[test]
    fn confirm_delivery_transitions_to_delivered() {
        let mut result = JobResult {
            job_id: Uuid::nil(),
            payload: serde_json::json!({}),
            delivery_state: DeliveryState::PendingDelivery,
        };
        result.confirm_delivery();
        assert_eq!(result.delivery_state, DeliveryState::Delivered);
        // idempotent: confirming again is a no-op success.
        result.confirm_delivery();
        assert_eq!(result.delivery_state, DeliveryState::Delivered);
    }
}
