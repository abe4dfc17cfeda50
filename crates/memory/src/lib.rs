//! Long-term-memory retrieval and persistence (spec §4.3 stages 5 and 11).
//!
//! Provides the [`MemoryStore`] and [`Embedder`] traits that abstract over
//! the vector index and the embedding model, a Postgres+pgvector
//! implementation of the former ([`PgMemoryStore`]), an OpenAI-compatible
//! implementation of the latter ([`HttpEmbedder`]), and the two pipeline
//! stage functions ([`retrieve`], [`persist`]) that orchestrate them.

pub mod embedder;
pub mod persistence;
pub mod provider;
pub mod retrieval;
pub mod store;
pub mod types;

pub use embedder::HttpEmbedder;
pub use persistence::persist;
pub use provider::{Embedder, MemoryStore};
pub use retrieval::{plan_waterfall, retrieve};
pub use store::PgMemoryStore;
pub use types::{
    ChannelScope, InsertOutcome, PersistenceRequest, RetrievalRequest, RetrievedMemory,
    SimilarityQuery, WaterfallPlan,
};
