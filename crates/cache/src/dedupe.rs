//! Request deduplication (§4.1, §8 property 1): for a given fingerprint, at
//! most one in-flight job id is returned across all ingress replicas within
//! the TTL window.
//!
//! Grounded on the gateway's in-memory `DedupeStore` (`check_and_insert`),
//! generalized from a per-process `HashMap` to the shared KV so the
//! guarantee holds across replicas, not just within one process.

use uuid::Uuid;

use relay_domain::Result;

use crate::kv::Kv;

pub struct DedupeStore {
    kv: Kv,
    ttl_secs: u64,
}

/// Outcome of a claim attempt against a fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// This caller's job id was stored; it is the canonical in-flight job.
    Inserted,
    /// Another caller already holds the fingerprint; its job id is returned.
    Existing(Uuid),
}

impl DedupeStore {
    pub fn new(kv: Kv, ttl_secs: u64) -> Self {
        Self { kv, ttl_secs }
    }

    fn key(fingerprint: &str) -> String {
        format!("dedupe:{fingerprint}")
    }

    /// Attempts to claim `fingerprint` for `job_id`. Uses `SET NX EX` so the
    /// claim and the TTL are applied atomically — no window where a crash
    /// between "check" and "insert" loses the TTL.
    pub async fn claim(&self, fingerprint: &str, job_id: Uuid) -> Result<Claim> {
        let key = Self::key(fingerprint);
        if self
            .kv
            .set_nx_ex(&key, &job_id.to_string(), self.ttl_secs)
            .await?
        {
            return Ok(Claim::Inserted);
        }
        match self.kv.get(&key).await? {
            Some(existing) => {
                let id = existing
                    .parse()
                    .map_err(|_| relay_domain::Error::Other("corrupt dedupe entry".into()))?;
                Ok(Claim::Existing(id))
            }
            // The entry expired between our failed NX and this GET; the
            // fingerprint is free again, so claim it ourselves.
            None => {
                self.kv.set_ex(&key, &job_id.to_string(), self.ttl_secs).await?;
                Ok(Claim::Inserted)
            }
        }
    }
}
