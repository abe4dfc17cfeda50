//! Query and result DTOs for long-term-memory retrieval and persistence
//! (spec stages 5 and 11). These sit above `relay_domain::types::{Memory,
//! PendingMemory}`, which remain the persisted row shapes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use relay_domain::types::MemoryScope;

/// Parameters for a single similarity query against the long-term-memory
/// store (either the channel-scoped leg or the global leg of a waterfall).
#[derive(Debug, Clone)]
pub struct SimilarityQuery {
    pub embedding: Vec<f32>,
    pub persona_id: Uuid,
    pub personality_id: Option<Uuid>,
    pub channel_id: Option<String>,
    pub score_threshold: f64,
    pub exclude_newer_than: Option<DateTime<Utc>>,
    pub exclude_ids: Vec<Uuid>,
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievedMemory {
    pub id: Uuid,
    pub text: String,
    pub scope: MemoryScope,
    pub score: f64,
    pub created_at: DateTime<Utc>,
}

/// Top-level parameters for stage 5, before the waterfall split is applied.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub query_text: String,
    pub persona_id: Uuid,
    pub personality_id: Option<Uuid>,
    pub score_threshold: f64,
    pub exclude_newer_than: Option<DateTime<Utc>>,
    pub limit: u32,
    /// `None` disables channel scoping entirely; global query only.
    pub channel_scope: Option<ChannelScope>,
}

#[derive(Debug, Clone)]
pub struct ChannelScope {
    pub channel_id: String,
    /// Fraction of `limit` reserved for the channel-scoped leg, clamped to
    /// [0, 1] before use.
    pub budget_ratio: f64,
}

/// The channel/global split computed from a `RetrievalRequest`'s limit and
/// ratio (spec §4.3 stage 5; boundary behavior: the channel share is
/// clamped to at least 1 once channel scoping is active).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaterfallPlan {
    pub channel_budget: u32,
    pub global_limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// Input to stage 11 (Memory Persistence).
#[derive(Debug, Clone)]
pub struct PersistenceRequest {
    pub persona_id: Uuid,
    pub personality_id: Option<Uuid>,
    pub message_text: String,
    pub referenced_content: Option<String>,
    pub session_id: Option<String>,
    pub channel_id: Option<String>,
    pub guild_id: Option<String>,
    pub sender_ids: Vec<String>,
}

impl PersistenceRequest {
    /// Text to embed: the message, optionally followed by a referenced-
    /// content suffix (spec §4.3 stage 11).
    pub fn embed_text(&self) -> String {
        match &self.referenced_content {
            Some(referenced) if !referenced.is_empty() => {
                format!("{}\n\n[Referenced content: {}]", self.message_text, referenced)
            }
            _ => self.message_text.clone(),
        }
    }

    pub fn scope(&self) -> MemoryScope {
        if self.session_id.is_some() {
            MemoryScope::Session
        } else {
            MemoryScope::Personal
        }
    }

    pub fn provenance(&self) -> serde_json::Value {
        serde_json::json!({
            "personaId": self.persona_id,
            "personalityId": self.personality_id,
            "channelId": self.channel_id,
            "guildId": self.guild_id,
            "senderIds": self.sender_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embed_text_without_referenced_content() {
        let req = PersistenceRequest {
            persona_id: Uuid::new_v4(),
            personality_id: None,
            message_text: "hello".into(),
            referenced_content: None,
            session_id: None,
            channel_id: None,
            guild_id: None,
            sender_ids: vec![],
        };
        assert_eq!(req.embed_text(), "hello");
    }

    #[test]
    fn embed_text_appends_referenced_content_suffix() {
        let req = PersistenceRequest {
            persona_id: Uuid::new_v4(),
            personality_id: None,
            message_text: "hello".into(),
            referenced_content: Some("earlier message".into()),
            session_id: None,
            channel_id: None,
            guild_id: None,
            sender_ids: vec![],
        };
        assert_eq!(req.embed_text(), "hello\n\n[Referenced content: earlier message]");
    }

    #[test]
    fn scope_is_session_when_session_id_present() {
        let mut req = PersistenceRequest {
            persona_id: Uuid::new_v4(),
            personality_id: None,
            message_text: "hi".into(),
            referenced_content: None,
            session_id: Some("sess-1".into()),
            channel_id: None,
            guild_id: None,
            sender_ids: vec![],
        };
        assert_eq!(req.scope(), MemoryScope::Session);
        req.session_id = None;
        assert_eq!(req.scope(), MemoryScope::Personal);
    }
}
