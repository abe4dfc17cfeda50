//! Diagnostics for a context-build pass — generalized from the teacher's
//! `ContextReport`/`FileReport` (per-section char accounting) into per-stage
//! counts for Context Preparation, Prompt Assembly, and Token Budgeting.

use serde::{Deserialize, Serialize};

use crate::budget::DroppedCounts;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextReport {
    pub participant_count: usize,
    pub memory_count: usize,
    pub system_prompt_chars: usize,
    pub dropped: DroppedCounts,
}
