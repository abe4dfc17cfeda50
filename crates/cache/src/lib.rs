//! Multi-tier cache & invalidation fabric.
//!
//! Depends only on `relay-domain`. Owns the single shared `redis`
//! connection manager per process (§5 "a single shared client per
//! process"), the dedup/rate-limit/idempotency-lock primitives built on
//! top of it, the typed invalidation bus, and the database notification
//! bridge that feeds it.

pub mod bus;
pub mod db_bridge;
pub mod dedupe;
pub mod kv;
pub mod lock;
pub mod ratelimit;
pub mod ttl_cache;

pub use bus::{InvalidationBus, InvalidationEvent};
pub use kv::Kv;
pub use ttl_cache::TtlCache;
