//! Context Preparation — pipeline stage 4 (spec §4.3), participant and
//! oldest-timestamp extraction.

use chrono::{DateTime, Utc};
use relay_domain::types::{HistoryMessage, ReferencedMessage};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub persona_id: Uuid,
}

/// Deduplicates participants by persona id, preserving first-seen order.
pub fn extract_participants(history: &[HistoryMessage]) -> Vec<Participant> {
    let mut seen = std::collections::HashSet::new();
    let mut participants = Vec::new();
    for message in history {
        if let Some(persona_id) = message.persona_id {
            if seen.insert(persona_id) {
                participants.push(Participant { persona_id });
            }
        }
    }
    participants
}

/// Oldest timestamp across history AND referenced messages, used downstream
/// to exclude the model's own recent turns from long-term-memory retrieval.
/// Returns `None` when there is nothing to derive a timestamp from.
pub fn oldest_timestamp(history: &[HistoryMessage], referenced: &[ReferencedMessage]) -> Option<DateTime<Utc>> {
    history
        .iter()
        .map(|m| &m.timestamp)
        .chain(referenced.iter().map(|r| &r.timestamp))
        .filter_map(|v| v.as_str())
        .filter_map(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(persona_id: Option<Uuid>, timestamp: &str) -> HistoryMessage {
        HistoryMessage {
            role: "user".into(),
            content: "hi".into(),
            timestamp: json!(timestamp),
            persona_id,
            referenced: None,
        }
    }

    #[test]
    fn dedups_participants_by_persona_id_preserving_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let history = vec![
            message(Some(a), "2024-01-01T00:00:00Z"),
            message(Some(b), "2024-01-02T00:00:00Z"),
            message(Some(a), "2024-01-03T00:00:00Z"),
            message(None, "2024-01-04T00:00:00Z"),
        ];
        let participants = extract_participants(&history);
        assert_eq!(participants, vec![Participant { persona_id: a }, Participant { persona_id: b }]);
    }

    #[test]
    fn oldest_timestamp_considers_both_history_and_referenced() {
        let history = vec![message(None, "2024-06-01T00:00:00Z")];
        let referenced = vec![ReferencedMessage { content: "x".into(), timestamp: json!("2024-01-01T00:00:00Z") }];
        let oldest = oldest_timestamp(&history, &referenced).unwrap();
        assert_eq!(oldest.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn empty_inputs_return_none() {
        assert!(oldest_timestamp(&[], &[]).is_none());
    }
}
