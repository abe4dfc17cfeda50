//! The ingress/worker binary: HTTP surface (spec §6), service-to-service
//! auth, and the process that wires every other crate together and runs
//! both the generation-job worker loop and the axum server.

pub mod api;
pub mod auth;
pub mod cli;
pub mod state;
pub mod stores;
pub mod worker;
