//! Normalization — pipeline stage 1 (spec §4.3).
//!
//! Incoming history arrives with inconsistent role casing and a mix of
//! epoch-millis and string timestamps from older callers. This stage
//! canonicalizes both fields in place before anything downstream reasons
//! about roles or orders messages by time.

use chrono::{DateTime, TimeZone, Utc};
use relay_domain::types::HistoryMessage;

/// Lowercases and matches against `"user"`/`"assistant"`. Anything else is
/// left completely unchanged (not even lowercased) — callers occasionally
/// send platform-specific roles (`"system"`, `"tool"`) that must survive
/// untouched, and silently coercing an unrecognized role to one of the two
/// known ones would corrupt history.
pub fn normalize_role(role: &str) -> String {
    match role.to_lowercase().as_str() {
        "user" => "user".to_string(),
        "assistant" => "assistant".to_string(),
        _ => {
            tracing::warn!(role, "normalization: unrecognized role left unchanged");
            role.to_string()
        }
    }
}

/// Coerces a `timestamp` field that may be an RFC3339 string or an epoch-millis
/// number into a canonical ISO-8601 string. Falls back to the current time,
/// with a warning, if the value can't be parsed either way.
pub fn normalize_timestamp(value: &serde_json::Value) -> String {
    if let Some(s) = value.as_str() {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
            return parsed.with_timezone(&Utc).to_rfc3339();
        }
        tracing::warn!(raw = s, "normalization: unparseable timestamp string, using now()");
        return Utc::now().to_rfc3339();
    }
    if let Some(millis) = value.as_i64() {
        if let Some(dt) = Utc.timestamp_millis_opt(millis).single() {
            return dt.to_rfc3339();
        }
    }
    tracing::warn!(?value, "normalization: timestamp neither string nor millis, using now()");
    Utc::now().to_rfc3339()
}

/// Runs stage 1 over a full history slice, returning normalized copies.
pub fn normalize_history(messages: &[HistoryMessage]) -> Vec<HistoryMessage> {
    messages
        .iter()
        .map(|m| HistoryMessage {
            role: normalize_role(&m.role),
            content: m.content.clone(),
            timestamp: serde_json::Value::String(normalize_timestamp(&m.timestamp)),
            persona_id: m.persona_id,
            referenced: m.referenced.clone().map(|r| relay_domain::types::ReferencedMessage {
                content: r.content,
                timestamp: serde_json::Value::String(normalize_timestamp(&r.timestamp)),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recognized_roles_are_lowercased() {
        assert_eq!(normalize_role("User"), "user");
        assert_eq!(normalize_role("USER"), "user");
        assert_eq!(normalize_role("Assistant"), "assistant");
    }

    #[test]
    fn unrecognized_role_is_left_untouched() {
        assert_eq!(normalize_role("SYSTEM"), "SYSTEM");
        assert_eq!(normalize_role("Tool"), "Tool");
    }

    #[test]
    fn rfc3339_string_round_trips() {
        let out = normalize_timestamp(&json!("2024-01-15T10:30:00Z"));
        assert!(out.starts_with("2024-01-15T10:30:00"));
    }

    #[test]
    fn epoch_millis_number_is_converted() {
        let out = normalize_timestamp(&json!(1_705_314_600_000i64));
        assert!(out.starts_with("2024-01-15"));
    }

    #[test]
    fn unparseable_value_falls_back_to_now_without_panicking() {
        let out = normalize_timestamp(&json!("not a date"));
        assert!(DateTime::parse_from_rfc3339(&out).is_ok());
    }

    #[test]
    fn normalize_history_canonicalizes_every_message() {
        let messages = vec![HistoryMessage {
            role: "USER".into(),
            content: "hi".into(),
            timestamp: json!(1_705_314_600_000i64),
            persona_id: None,
            referenced: None,
        }];
        let normalized = normalize_history(&messages);
        assert_eq!(normalized[0].role, "user");
        assert!(normalized[0].timestamp.as_str().unwrap().starts_with("2024-01-15"));
    }
}
