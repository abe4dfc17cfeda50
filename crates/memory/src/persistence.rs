//! Memory Persistence — pipeline stage 11 (spec §4.3).
//!
//! Writes go through a `PendingMemory` staging row first so a transient
//! vector-store failure never drops the write on the floor: the pending
//! row is created before the insert is attempted, deleted on success, and
//! left in place (with `attempts`/`last_error` updated) on failure for
//! later retry. Generation itself must never fail because of this step —
//! callers log and move on rather than propagating the error upward.

use chrono::Utc;

use relay_domain::ids::derive_memory_id;
use relay_domain::types::{Memory, PendingMemory};

use crate::provider::{Embedder, MemoryStore};
use crate::types::PersistenceRequest;

/// Runs stage 11. Never returns an error to the caller — all failures are
/// logged and leave the pending row in place for a later retry pass.
pub async fn persist(store: &dyn MemoryStore, embedder: &dyn Embedder, request: &PersistenceRequest) {
    let embed_text = request.embed_text();
    let embedding = match embedder.embed(&embed_text).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "memory persistence: embedding failed, dropping write");
            return;
        }
    };

    let id = derive_memory_id(request.persona_id, request.personality_id, &embed_text);
    let pending = PendingMemory {
        id,
        text: embed_text,
        embedding,
        scope: request.scope(),
        created_at: Utc::now(),
        provenance: request.provenance(),
        attempts: 0,
        last_error: None,
    };

    if let Err(e) = store.create_pending(&pending).await {
        tracing::warn!(error = %e, memory_id = %id, "memory persistence: failed to create pending row");
        return;
    }

    let memory: Memory = (&pending).into();
    match store.insert_memory(&memory).await {
        Ok(_) => {
            if let Err(e) = store.delete_pending(id).await {
                tracing::warn!(error = %e, memory_id = %id, "memory persistence: insert succeeded but pending row cleanup failed");
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, memory_id = %id, "memory persistence: vector insert failed, retained in pending-memory safety net");
            if let Err(mark_err) = store.mark_pending_failed(id, &e.to_string()).await {
                tracing::warn!(error = %mark_err, memory_id = %id, "memory persistence: failed to record pending-row attempt");
            }
        }
    }
}
