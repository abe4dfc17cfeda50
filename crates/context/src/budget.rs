//! Token Budgeting — pipeline stage 7 (spec §4.3).
//!
//! Generalizes the teacher's per-file/total-char-cap truncation
//! (`truncate_per_file`/`apply_total_cap`) from trimming workspace-file text
//! to trimming a generation prompt: instead of slicing one string at a char
//! boundary, this drops whole history messages (oldest first) and whole
//! memories (lowest-ranked first) until the assembled prompt fits the
//! model's context window.
//!
//! No tokenizer crate is wired in (the corpus has no tiktoken-equivalent
//! dependency); token counts are approximated at 4 characters per token,
//! the same order-of-magnitude heuristic the teacher's char-budgets already
//! encode implicitly.

use relay_memory::RetrievedMemory;
use relay_providers::traits::ChatMessage;
use serde::{Deserialize, Serialize};

/// Approximates token count from character count. Not exact — a stand-in
/// for a real tokenizer, consistent with how the rest of this budget is
/// approximate by design.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedCounts {
    pub history_messages_dropped: usize,
    pub memories_dropped: usize,
}

#[derive(Debug, Clone)]
pub struct BudgetedPrompt {
    pub history: Vec<ChatMessage>,
    pub memories: Vec<RetrievedMemory>,
    pub dropped: DroppedCounts,
}

/// Trims `history` (oldest-first) and `memories` (lowest-score-first) until
/// `system_prompt` + remaining history + `final_turn` + `completion_reserve`
/// fits within `context_window` tokens. `final_turn` is never dropped.
pub fn apply_budget(
    system_prompt: &str,
    mut history: Vec<ChatMessage>,
    mut memories: Vec<RetrievedMemory>,
    final_turn: &str,
    context_window: u32,
    completion_reserve: u32,
) -> BudgetedPrompt {
    memories.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let fixed_tokens = estimate_tokens(system_prompt) + estimate_tokens(final_turn) + completion_reserve as usize;
    let budget = (context_window as usize).saturating_sub(fixed_tokens);

    let mut dropped = DroppedCounts::default();

    loop {
        let history_tokens: usize = history.iter().map(|m| estimate_tokens(&m.content)).sum();
        let memory_tokens: usize = memories.iter().map(|m| estimate_tokens(&m.text)).sum();

        if history_tokens + memory_tokens <= budget || (history.is_empty() && memories.is_empty()) {
            break;
        }

        if !memories.is_empty() {
            memories.pop();
            dropped.memories_dropped += 1;
        } else if !history.is_empty() {
            history.remove(0);
            dropped.history_messages_dropped += 1;
        }
    }

    BudgetedPrompt { history, memories, dropped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use relay_domain::types::MemoryScope;
    use uuid::Uuid;

    fn msg(content: &str) -> ChatMessage {
        ChatMessage { role: "user".into(), content: content.into() }
    }

    fn memory(text: &str, score: f64) -> RetrievedMemory {
        RetrievedMemory { id: Uuid::new_v4(), text: text.into(), scope: MemoryScope::Personal, score, created_at: Utc::now() }
    }

    #[test]
    fn fits_within_budget_drops_nothing() {
        let result = apply_budget("sys", vec![msg("hi")], vec![memory("mem", 0.9)], "final", 10_000, 100);
        assert_eq!(result.dropped, DroppedCounts::default());
        assert_eq!(result.history.len(), 1);
        assert_eq!(result.memories.len(), 1);
    }

    #[test]
    fn drops_lowest_ranked_memories_before_touching_history() {
        let big_memory = "x".repeat(4000);
        let result = apply_budget(
            "sys",
            vec![msg("recent turn")],
            vec![memory("low", 0.1), memory(&big_memory, 0.9)],
            "final",
            1200,
            50,
        );
        assert_eq!(result.dropped.memories_dropped, 1);
        assert_eq!(result.dropped.history_messages_dropped, 0);
        assert_eq!(result.memories.len(), 1);
        assert_eq!(result.memories[0].text, big_memory, "higher-scored memory survives");
    }

    #[test]
    fn drops_oldest_history_once_memories_are_exhausted() {
        let result = apply_budget(
            "sys",
            vec![msg(&"a".repeat(2000)), msg("recent")],
            vec![],
            "final",
            520,
            10,
        );
        assert_eq!(result.dropped.history_messages_dropped, 1);
        assert_eq!(result.history.len(), 1);
        assert_eq!(result.history[0].content, "recent", "oldest message dropped first");
    }

    #[test]
    fn never_drops_the_final_turn() {
        let result = apply_budget("sys", vec![], vec![], &"z".repeat(10_000), 1, 0);
        assert!(result.history.is_empty());
        assert!(result.memories.is_empty());
    }
}
