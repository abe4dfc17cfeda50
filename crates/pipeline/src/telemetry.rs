//! Stop-Sequence Telemetry — pipeline stage 10 (spec §4.3, §9 redesign
//! note). A diagnostic only: an inferred activation never changes the
//! result, it is recorded for later inspection.
//!
//! The teacher's original is a global mutable counter; per §9 this is
//! replaced with a process-local [`std::sync::atomic::AtomicU64`] plus a
//! best-effort `HINCRBY` against a shared KV hash so counts aggregate across
//! replicas. A dedicated read endpoint (outside this crate's scope) would
//! scan that hash.

use std::sync::atomic::{AtomicU64, Ordering};

use redis::AsyncCommands;

use relay_cache::Kv;

const PROTOCOL_TERMINATOR: &str = "</message>";

/// KV hash read by the gateway's `/admin/stop-sequences` telemetry endpoint.
pub const TELEMETRY_HASH_KEY: &str = "telemetry:inferred_stop_sequence";

/// Process-local count of inferred stop-sequence activations since startup.
pub static INFERRED_STOP_SEQUENCE_COUNT: AtomicU64 = AtomicU64::new(0);

pub struct StopSequenceCheck<'a> {
    pub configured_stop_sequences: &'a [String],
    pub provider_finish_reason: Option<&'a str>,
    pub raw_content: &'a str,
}

fn is_natural_stop(finish_reason: Option<&str>) -> bool {
    matches!(finish_reason, Some(r) if r.eq_ignore_ascii_case("stop"))
}

/// True when the model appears to have been cut off by one of its
/// configured stop sequences rather than completing the protocol's own
/// `</message>` terminator.
pub fn is_inferred_stop_sequence(check: &StopSequenceCheck<'_>) -> bool {
    !check.configured_stop_sequences.is_empty()
        && is_natural_stop(check.provider_finish_reason)
        && !check.raw_content.trim_end().ends_with(PROTOCOL_TERMINATOR)
}

/// Bumps the local counter and best-effort increments the cross-process KV
/// hash field keyed by `personality_id`. KV failures are logged and
/// swallowed — this is telemetry, never part of the pipeline's result.
pub async fn record_activation(kv: &Kv, personality_id: &str) {
    INFERRED_STOP_SEQUENCE_COUNT.fetch_add(1, Ordering::Relaxed);

    let mut conn = kv.raw();
    let result: Result<i64, redis::RedisError> = conn.hincr(TELEMETRY_HASH_KEY, personality_id, 1).await;
    if let Err(e) = result {
        tracing::warn!(error = %e, personality_id, "failed to record inferred-stop-sequence telemetry in KV");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_configured_stop_sequences_is_never_inferred() {
        let check = StopSequenceCheck {
            configured_stop_sequences: &[],
            provider_finish_reason: Some("stop"),
            raw_content: "partial reply",
        };
        assert!(!is_inferred_stop_sequence(&check));
    }

    #[test]
    fn non_natural_finish_reason_is_never_inferred() {
        let check = StopSequenceCheck {
            configured_stop_sequences: &["STOP_SEQ".to_string()],
            provider_finish_reason: Some("length"),
            raw_content: "partial reply",
        };
        assert!(!is_inferred_stop_sequence(&check));
    }

    #[test]
    fn content_ending_with_protocol_terminator_is_not_inferred() {
        let check = StopSequenceCheck {
            configured_stop_sequences: &["STOP_SEQ".to_string()],
            provider_finish_reason: Some("stop"),
            raw_content: "hello</message>",
        };
        assert!(!is_inferred_stop_sequence(&check));
    }

    #[test]
    fn natural_stop_without_terminator_is_inferred() {
        let check = StopSequenceCheck {
            configured_stop_sequences: &["STOP_SEQ".to_string()],
            provider_finish_reason: Some("STOP"),
            raw_content: "hello there",
        };
        assert!(is_inferred_stop_sequence(&check));
    }
}
