//! Per-message idempotency lock (§5): `SET key value NX EX ttl` in the
//! shared KV. Successful acquisition returns `true`; callers that fail
//! processing must release the lock to re-enable retries (§8 E6); callers
//! that succeed leave the lock in place for its TTL.
//!
//! Grounded on the gateway's `SessionLockMap` (same "acquire before doing
//! work, guard releases it" shape) generalized from an in-process
//! `Semaphore` to a cross-replica KV lock, since the spec requires the
//! guarantee to hold across ingress replicas.

use uuid::Uuid;

use relay_domain::Result;

use crate::kv::Kv;

pub struct MessageLock {
    kv: Kv,
    ttl_secs: u64,
}

impl MessageLock {
    pub fn new(kv: Kv, ttl_secs: u64) -> Self {
        Self { kv, ttl_secs }
    }

    fn key(message_id: &str) -> String {
        format!("lock:message:{message_id}")
    }

    /// Attempts to mark `message_id` as processing. Returns `true` if the
    /// lock was acquired by this call.
    pub async fn mark_processing(&self, message_id: &str) -> Result<bool> {
        let token = Uuid::new_v4().to_string();
        self.kv
            .set_nx_ex(&Self::key(message_id), &token, self.ttl_secs)
            .await
    }

    /// Releases the lock so a subsequent retry can acquire it again. Callers
    /// must invoke this on any failure path (§8 E6); a successful path
    /// leaves the lock to expire naturally.
    pub async fn release(&self, message_id: &str) -> Result<()> {
        self.kv.del(&Self::key(message_id)).await
    }
}
