//! The Generation Pipeline (spec §4.3): normalization and config/auth
//! resolution live in `relay-sessions`/`relay-providers`; context
//! preparation, prompt assembly, and token budgeting live in
//! `relay-context`; memory retrieval/persistence live in `relay-memory`.
//! This crate supplies what has no other home — post-processing,
//! stop-sequence telemetry, delivery hand-off — and the orchestrator that
//! threads a request through all twelve stages in order.

pub mod delivery;
pub mod pipeline;
pub mod postprocess;
pub mod telemetry;

pub use delivery::{hand_off, PgDeliveryStore};
pub use pipeline::{run_generation, GenerationDeps, GenerationOutcome, GenerationRequest};
pub use postprocess::{extract_reasoning, is_duplicate_response, post_process, strip_artifacts, PostProcessResult};
pub use telemetry::{
    is_inferred_stop_sequence, record_activation, StopSequenceCheck, INFERRED_STOP_SEQUENCE_COUNT,
    TELEMETRY_HASH_KEY,
};
