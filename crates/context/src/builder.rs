//! Orchestrates Context Preparation (stage 4), Prompt Assembly (stage 6),
//! and Token Budgeting (stage 7) into one pass over a generation request.
//! Kept as a pure function over its inputs, the same shape as the teacher's
//! `ContextPackBuilder::build`.

use relay_domain::types::{HistoryMessage, Persona, Personality, ReferencedMessage};
use relay_memory::RetrievedMemory;
use relay_providers::traits::ChatMessage;

use crate::budget::{self, BudgetedPrompt};
use crate::participants::{self, Participant};
use crate::placeholders::PlaceholderNames;
use crate::prompt::{self, PromptInputs};
use crate::report::ContextReport;

pub struct ContextPackBuilder {
    pub completion_reserve: u32,
}

impl ContextPackBuilder {
    pub fn new(completion_reserve: u32) -> Self {
        Self { completion_reserve }
    }

    /// Runs stages 4, 6, and 7 in order and returns the final messages the
    /// LLM request will carry, plus a diagnostics report.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        &self,
        persona: &Persona,
        personality: &Personality,
        history: &[HistoryMessage],
        referenced: &[ReferencedMessage],
        memories: &[RetrievedMemory],
        names: &PlaceholderNames,
        final_user_turn: &str,
    ) -> (BudgetedPrompt, String, ContextReport) {
        let participants: Vec<Participant> = participants::extract_participants(history);

        let system_prompt = prompt::assemble_system_prompt(
            &PromptInputs {
                persona,
                personality,
                participants: &participants,
                user_display_name: &names.user_display_name,
                user_handle: names.user_handle.as_deref(),
                memories,
            },
            names,
        );

        let chat_history: Vec<ChatMessage> =
            history.iter().map(|m| ChatMessage { role: m.role.clone(), content: m.content.clone() }).collect();

        let budgeted = budget::apply_budget(
            &system_prompt,
            chat_history,
            memories.to_vec(),
            final_user_turn,
            personality.context_window,
            self.completion_reserve,
        );

        let _ = participants::oldest_timestamp(history, referenced);

        let report = ContextReport {
            participant_count: participants.len(),
            memory_count: budgeted.memories.len(),
            system_prompt_chars: system_prompt.len(),
            dropped: budgeted.dropped,
        };

        (budgeted, system_prompt, report)
    }
}
