//! `MemoryStore` and `Embedder` define the two external-facing seams of
//! this crate: a vector-indexed long-term-memory store (§3 `Memory` /
//! `PendingMemory`) and the embedding model that turns text into the
//! vectors it's queried by. Real implementations live in [`crate::store`]
//! and [`crate::embedder`]; tests substitute in-memory doubles.

use async_trait::async_trait;
use relay_domain::error::Result;
use relay_domain::types::{Memory, PendingMemory};
use uuid::Uuid;

use crate::types::{InsertOutcome, RetrievedMemory, SimilarityQuery};

/// Abstraction over the long-term-memory vector index and its pending-write
/// safety net.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Vector similarity search, scoped by persona (required) and
    /// optionally personality and channel.
    async fn query_similar(&self, query: &SimilarityQuery) -> Result<Vec<RetrievedMemory>>;

    /// Insert a memory row. Idempotent: a second insert with the same
    /// deterministic id is a no-op (spec §3, §8 property 3).
    async fn insert_memory(&self, memory: &Memory) -> Result<InsertOutcome>;

    async fn create_pending(&self, pending: &PendingMemory) -> Result<()>;
    async fn delete_pending(&self, id: Uuid) -> Result<()>;
    async fn mark_pending_failed(&self, id: Uuid, error: &str) -> Result<()>;
}

/// Abstraction over the embedding model used to turn memory text and query
/// text into vectors. Kept separate from `MemoryStore` because the
/// embedding provider and the vector index are independently swappable.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
