//! Prompt assembly for the Generation Pipeline (spec §4.3 stages 4, 6, 7):
//! participant/oldest-timestamp extraction, deterministic system-prompt
//! construction with placeholder substitution and protected-tag escaping,
//! and token budgeting that drops history/memories to fit the model's
//! context window.

pub mod budget;
pub mod builder;
pub mod escaping;
pub mod participants;
pub mod placeholders;
pub mod prompt;
pub mod report;

pub use budget::{apply_budget, estimate_tokens, BudgetedPrompt, DroppedCounts};
pub use builder::ContextPackBuilder;
pub use escaping::{escape_protected_tags, render_section};
pub use participants::{extract_participants, oldest_timestamp, Participant};
pub use placeholders::{names_collide, replace_placeholders, PlaceholderNames};
pub use prompt::{assemble_system_prompt, PromptInputs};
pub use report::ContextReport;
