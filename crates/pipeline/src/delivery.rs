//! Delivery Hand-off — pipeline stage 12 (spec §4.3, §3 `JobResult`).
//!
//! The generation result is written to two places: a streams entry on the
//! shared KV for push delivery, and a row in the relational store with
//! `delivery_state = PENDING_DELIVERY`. The hand-off itself is complete
//! once both writes land; ultimate user-visible delivery is confirmed later
//! by an explicit `confirm_delivery` call, which is the only place
//! `delivery_state` ever moves to `DELIVERED` (idempotent — §8 E6).
//!
//! Grounded on `relay_sessions::PgChannelStore`'s query shape for the
//! relational half, and on `relay_cache::Kv`'s raw redis handle for the
//! streams half (no higher-level streams wrapper exists in that crate yet).

use redis::AsyncCommands;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use relay_cache::Kv;
use relay_domain::error::{Error, Result};
use relay_domain::jsonb::sanitize_for_jsonb;
use relay_domain::types::{DeliveryState, JobResult};

const RESULT_STREAM_KEY: &str = "results:stream";

fn sql_err(context: &str, e: sqlx::Error) -> Error {
    Error::Other(format!("{context}: {e}"))
}

pub struct PgDeliveryStore {
    pool: PgPool,
}

impl PgDeliveryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts the job result row as `PENDING_DELIVERY`. A job id is unique
    /// per job, so a conflicting insert (a retried hand-off) overwrites the
    /// payload rather than failing the stage.
    async fn insert_pending(&self, result: &JobResult) -> Result<()> {
        let payload = sanitize_for_jsonb(result.payload.clone());
        sqlx::query(
            r#"
            INSERT INTO job_results (job_id, payload, delivery_state)
            VALUES ($1, $2, 'PENDING_DELIVERY')
            ON CONFLICT (job_id) DO UPDATE SET payload = EXCLUDED.payload
            "#,
        )
        .bind(result.job_id)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| sql_err("job result insert failed", e))?;
        Ok(())
    }

    /// §3 invariant: transitions only PENDING_DELIVERY → DELIVERED, and is
    /// a no-op success if the row is already DELIVERED (§8 E6, §9 open
    /// question resolved in DESIGN.md).
    pub async fn confirm_delivery(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE job_results SET delivery_state = 'DELIVERED' WHERE job_id = $1 AND delivery_state = 'PENDING_DELIVERY'",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| sql_err("confirm delivery failed", e))?;
        Ok(())
    }

    pub async fn get(&self, job_id: Uuid) -> Result<Option<JobResult>> {
        let row = sqlx::query("SELECT job_id, payload, delivery_state FROM job_results WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| sql_err("job result lookup failed", e))?;

        row.map(|r| row_to_result(&r)).transpose()
    }
}

fn row_to_result(row: &sqlx::postgres::PgRow) -> Result<JobResult> {
    let state_str: String = row.try_get("delivery_state").map_err(|e| sql_err("row delivery_state", e))?;
    let delivery_state = match state_str.as_str() {
        "DELIVERED" => DeliveryState::Delivered,
        _ => DeliveryState::PendingDelivery,
    };
    Ok(JobResult {
        job_id: row.try_get("job_id").map_err(|e| sql_err("row job_id", e))?,
        payload: row.try_get("payload").map_err(|e| sql_err("row payload", e))?,
        delivery_state,
    })
}

/// Appends `result` to the shared KV results stream with `XADD`, for the
/// push-delivery side of the hand-off.
async fn publish_stream_entry(kv: &Kv, result: &JobResult) -> Result<()> {
    let payload = serde_json::to_string(&result.payload).map_err(|e| Error::Other(e.to_string()))?;
    let mut conn = kv.raw();
    let _: String = conn
        .xadd(RESULT_STREAM_KEY, "*", &[("job_id", result.job_id.to_string()), ("payload", payload)])
        .await
        .map_err(|e| Error::Other(format!("redis XADD {RESULT_STREAM_KEY}: {e}")))?;
    Ok(())
}

/// Runs stage 12: both writes happen, in this order, before the stage
/// returns. The stream entry is the faster push path and is written first;
/// the relational row is the durable record a client's `confirm-delivery`
/// call ultimately flips to `DELIVERED`.
pub async fn hand_off(kv: &Kv, store: &PgDeliveryStore, result: &JobResult) -> Result<()> {
    publish_stream_entry(kv, result).await?;
    store.insert_pending(result).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_job_result_starts_pending_delivery() {
        let result = JobResult {
            job_id: Uuid::new_v4(),
            payload: serde_json::json!({"content": "hi"}),
            delivery_state: DeliveryState::PendingDelivery,
        };
        assert_eq!(result.delivery_state, DeliveryState::PendingDelivery);
    }
}
