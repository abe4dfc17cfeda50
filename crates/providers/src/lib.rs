//! Auth resolution (pipeline stage 3) and LLM invocation (stage 8).
//!
//! Depends on `relay-domain` (types, error taxonomy, credential crypto) and
//! `relay-cache` (the per-user API-key/LLM-config hot caches named in
//! spec §4.4).

pub mod auth;
pub mod openrouter;
pub mod traits;

pub use auth::{resolve_auth, AuthResolution};
pub use traits::{ChatRequest, ChatResponse, LlmProvider};
