//! Shared primitives for the relaycore generation backend.
//!
//! This crate has no dependency on any other workspace crate; it is the
//! leaf of the dependency graph (config, error taxonomy, domain types,
//! encryption, deterministic id derivation, JSONB sanitization).

pub mod config;
pub mod crypto;
pub mod error;
pub mod ids;
pub mod jsonb;
pub mod types;

pub use error::{Error, ErrorCategory, Result};
