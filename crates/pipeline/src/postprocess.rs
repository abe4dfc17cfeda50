//! Post-Processing — pipeline stage 9 (spec §4.3).
//!
//! Separates hidden `<reasoning>` content from the user-visible reply,
//! strips artifacts the model sometimes echoes back (a name-label prefix,
//! or a literal occurrence of one of the protocol's structural tags), and
//! flags exact duplicate responses against recent conversation history.

use relay_domain::types::HistoryMessage;

const REASONING_OPEN: &str = "<reasoning>";
const REASONING_CLOSE: &str = "</reasoning>";

/// Tags the prompt assembler wraps personality fields in (see
/// `relay_context::escaping::PROTECTED_TAGS`); a model that echoes the
/// instruction scaffolding back verbatim leaves these as stray literal
/// markup in the reply.
const ECHOED_TAGS: [&str; 8] = [
    "<persona>",
    "</persona>",
    "<protocol>",
    "</protocol>",
    "<identity_constraints>",
    "</identity_constraints>",
    "<platform_constraints>",
    "</platform_constraints>",
];

/// Last N assistant messages considered for duplicate comparison.
pub const DUPLICATE_RECENT_N: usize = 5;
/// Scan at most this many history entries regardless of how far back the
/// Nth assistant message actually sits (spec §8: O(1) amortized, <100ms on
/// a 10,000-entry history).
pub const DUPLICATE_MAX_SCAN_DEPTH: usize = 100;

#[derive(Debug, Clone)]
pub struct PostProcessResult {
    pub reasoning: Option<String>,
    pub content: String,
    pub is_duplicate: bool,
}

/// Splits `<reasoning>...</reasoning>` out of `text`, matched
/// case-insensitively. Returns the reasoning text (trimmed) and the
/// remainder with the tagged span removed. Absent or malformed tags (close
/// before open, or either missing) leave `text` untouched.
pub fn extract_reasoning(text: &str) -> (Option<String>, String) {
    let lower = text.to_ascii_lowercase();
    let (Some(open), Some(close)) = (lower.find(REASONING_OPEN), lower.find(REASONING_CLOSE)) else {
        return (None, text.to_string());
    };
    if close <= open {
        return (None, text.to_string());
    }

    let reasoning = text[open + REASONING_OPEN.len()..close].trim().to_string();
    let mut remainder = String::with_capacity(text.len());
    remainder.push_str(&text[..open]);
    remainder.push_str(&text[close + REASONING_CLOSE.len()..]);
    (Some(reasoning), remainder.trim().to_string())
}

/// Removes a leading `"{assistant_display_name}:"` label and any stray
/// occurrence of the protocol's structural tags.
pub fn strip_artifacts(text: &str, assistant_display_name: &str) -> String {
    let trimmed = text.trim_start();
    let label = format!("{assistant_display_name}:");
    let without_label = if trimmed.get(..label.len()).map(|head| head.eq_ignore_ascii_case(&label)).unwrap_or(false) {
        trimmed[label.len()..].trim_start()
    } else {
        trimmed
    };

    let mut cleaned = without_label.to_string();
    for tag in ECHOED_TAGS {
        cleaned = cleaned.replace(tag, "");
    }
    cleaned.trim().to_string()
}

/// Compares `candidate` against the last `recent_n` assistant messages found
/// within the most recent `max_scan_depth` history entries. Exact match,
/// case-insensitive, whitespace-trimmed.
pub fn is_duplicate_response(
    candidate: &str,
    history: &[HistoryMessage],
    recent_n: usize,
    max_scan_depth: usize,
) -> bool {
    let normalized = candidate.trim().to_lowercase();
    history
        .iter()
        .rev()
        .take(max_scan_depth)
        .filter(|m| m.role.eq_ignore_ascii_case("assistant"))
        .take(recent_n)
        .any(|m| m.content.trim().to_lowercase() == normalized)
}

/// Runs stage 9 end to end over the raw LLM completion text.
pub fn post_process(raw_content: &str, assistant_display_name: &str, history: &[HistoryMessage]) -> PostProcessResult {
    let (reasoning, without_reasoning) = extract_reasoning(raw_content);
    let content = strip_artifacts(&without_reasoning, assistant_display_name);
    let is_duplicate = is_duplicate_response(&content, history, DUPLICATE_RECENT_N, DUPLICATE_MAX_SCAN_DEPTH);
    PostProcessResult { reasoning, content, is_duplicate }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assistant_msg(content: &str) -> HistoryMessage {
        HistoryMessage {
            role: "assistant".into(),
            content: content.into(),
            timestamp: json!("2024-01-01T00:00:00Z"),
            persona_id: None,
            referenced: None,
        }
    }

    fn user_msg(content: &str) -> HistoryMessage {
        HistoryMessage {
            role: "user".into(),
            content: content.into(),
            timestamp: json!("2024-01-01T00:00:00Z"),
            persona_id: None,
            referenced: None,
        }
    }

    #[test]
    fn extracts_reasoning_and_trims_remainder() {
        let (reasoning, content) = extract_reasoning("<reasoning>thinking it over</reasoning>\nHello there");
        assert_eq!(reasoning.as_deref(), Some("thinking it over"));
        assert_eq!(content, "Hello there");
    }

    #[test]
    fn absent_reasoning_tag_is_a_no_op() {
        let (reasoning, content) = extract_reasoning("just a reply");
        assert!(reasoning.is_none());
        assert_eq!(content, "just a reply");
    }

    #[test]
    fn close_before_open_is_treated_as_malformed_and_left_alone() {
        let (reasoning, content) = extract_reasoning("</reasoning>garbled<reasoning>");
        assert!(reasoning.is_none());
        assert_eq!(content, "</reasoning>garbled<reasoning>");
    }

    #[test]
    fn strips_name_label_prefix_case_insensitively() {
        let cleaned = strip_artifacts("ARIA: hello there", "Aria");
        assert_eq!(cleaned, "hello there");
    }

    #[test]
    fn strips_echoed_protocol_tags_without_touching_emoticons() {
        let cleaned = strip_artifacts("<protocol>hi <3 friend</protocol>", "Aria");
        assert_eq!(cleaned, "hi <3 friend");
    }

    #[test]
    fn duplicate_detection_matches_case_insensitively_and_trims_whitespace() {
        let history = vec![user_msg("hi"), assistant_msg("  Hello World  ")];
        assert!(is_duplicate_response("hello world", &history, DUPLICATE_RECENT_N, DUPLICATE_MAX_SCAN_DEPTH));
    }

    #[test]
    fn distinct_reply_is_not_a_duplicate() {
        let history = vec![assistant_msg("good morning")];
        assert!(!is_duplicate_response("good evening", &history, DUPLICATE_RECENT_N, DUPLICATE_MAX_SCAN_DEPTH));
    }

    #[test]
    fn only_the_most_recent_n_assistant_messages_are_considered() {
        let mut history = vec![assistant_msg("old reply")];
        for _ in 0..DUPLICATE_RECENT_N {
            history.push(assistant_msg("filler"));
        }
        assert!(!is_duplicate_response("old reply", &history, DUPLICATE_RECENT_N, DUPLICATE_MAX_SCAN_DEPTH));
    }

    #[test]
    fn scan_depth_is_bounded_regardless_of_history_length() {
        let mut history = vec![assistant_msg("ancient reply")];
        for _ in 0..10_000 {
            history.push(user_msg("noise"));
        }
        assert!(!is_duplicate_response("ancient reply", &history, DUPLICATE_RECENT_N, 100));
    }

    #[test]
    fn full_post_process_pipeline() {
        let history = vec![assistant_msg("previous reply")];
        let result = post_process("<reasoning>plan</reasoning>Aria: hi there", "Aria", &history);
        assert_eq!(result.reasoning.as_deref(), Some("plan"));
        assert_eq!(result.content, "hi there");
        assert!(!result.is_duplicate);
    }
}
