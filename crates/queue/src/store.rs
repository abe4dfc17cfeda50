//! `PgJobStore` — the durable job queue table (spec §4.2).
//!
//! Grounded on `relay_sessions::PgChannelStore`/`relay_pipeline::PgDeliveryStore`:
//! one pooled resource, plain `sqlx::query` (no `query!` macro, no live DB at
//! build time), a local `sql_err` helper, `Row::try_get` row mapping.
//!
//! `enqueue` is idempotent on `job.id` (spec: "options include jobId
//! (idempotency)") via `ON CONFLICT (id) DO NOTHING` — a second enqueue with
//! the same id is a no-op, not an error. `claim_next` uses
//! `FOR UPDATE SKIP LOCKED` so concurrent workers never double-claim the same
//! row, and filters to rows whose `dependencies` are all `Completed`
//! (spec §4.2 job chaining) and whose `run_at` has passed (backoff delay).

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use relay_domain::error::{Error, Result};
use relay_domain::types::{Job, JobState, JobType};

use crate::dependencies::dependencies_satisfied;
use crate::retry::RetryPolicy;

fn sql_err(context: &str, e: sqlx::Error) -> Error {
    Error::Other(format!("{context}: {e}"))
}

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a new job at `JobState::Queued`. A repeat call with the same
    /// `job.id` is a no-op: the caller may safely retry enqueue on a
    /// connection failure without risking a duplicate job.
    pub async fn enqueue(&self, job: &Job) -> Result<()> {
        let job_type = serde_json::to_value(job.job_type).map_err(|e| Error::Other(e.to_string()))?;
        let state = serde_json::to_value(job.state).map_err(|e| Error::Other(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO job_queue (id, job_type, payload, state, attempt, dependencies, run_at)
            VALUES ($1, $2, $3, $4, $5, $6, now())
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(job.id)
        .bind(job_type)
        .bind(&job.payload)
        .bind(state)
        .bind(job.attempt as i32)
        .bind(&job.dependencies)
        .execute(&self.pool)
        .await
        .map_err(|e| sql_err("job enqueue failed", e))?;
        Ok(())
    }

    /// Claims the oldest eligible `Queued` job of `job_type`: not delayed
    /// past `run_at`, and with all `dependencies` `Completed`. Marks it
    /// `Active` and bumps `attempt` before returning it. `FOR UPDATE SKIP
    /// LOCKED` means a worker racing another worker simply sees the next
    /// eligible row instead of blocking on the lock.
    pub async fn claim_next(&self, job_type: JobType) -> Result<Option<Job>> {
        let job_type_json = serde_json::to_value(job_type).map_err(|e| Error::Other(e.to_string()))?;
        let mut tx = self.pool.begin().await.map_err(|e| sql_err("claim transaction begin failed", e))?;

        let candidates = sqlx::query(
            r#"
            SELECT id, job_type, payload, state, attempt, result, error, dependencies
            FROM job_queue
            WHERE job_type = $1 AND state = 'queued' AND run_at <= now()
            ORDER BY run_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 20
            "#,
        )
        .bind(&job_type_json)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| sql_err("claim candidate scan failed", e))?;

        for row in &candidates {
            let mut job = row_to_job(row)?;
            let completed = completed_dependency_states(&mut tx, &job.dependencies).await?;
            if !dependencies_satisfied(&job.dependencies, &completed) {
                continue;
            }

            job.state = JobState::Active;
            job.attempt += 1;
            sqlx::query("UPDATE job_queue SET state = 'active', attempt = $2 WHERE id = $1")
                .bind(job.id)
                .bind(job.attempt as i32)
                .execute(&mut *tx)
                .await
                .map_err(|e| sql_err("claim update failed", e))?;
            tx.commit().await.map_err(|e| sql_err("claim transaction commit failed", e))?;
            return Ok(Some(job));
        }

        tx.commit().await.map_err(|e| sql_err("claim transaction commit failed", e))?;
        Ok(None)
    }

    /// Marks a job `Completed` and records its result payload.
    pub async fn complete(&self, job_id: Uuid, result: serde_json::Value) -> Result<()> {
        sqlx::query("UPDATE job_queue SET state = 'completed', result = $2, error = NULL WHERE id = $1")
            .bind(job_id)
            .bind(result)
            .execute(&self.pool)
            .await
            .map_err(|e| sql_err("job complete failed", e))?;
        Ok(())
    }

    /// Records a failed attempt. If the retry policy for this job's type
    /// still allows another attempt, the job goes back to `Queued` with
    /// `run_at` pushed out by the policy's backoff delay; otherwise it is
    /// dead-lettered at `Failed` with `error` set (spec §4.2: "last-attempt
    /// failure transitions job state to `failed`").
    pub async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        let row = sqlx::query("SELECT job_type, attempt FROM job_queue WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| sql_err("job lookup before fail failed", e))?;
        let Some(row) = row else { return Ok(()) };

        let job_type: JobType = serde_json::from_value(row.try_get("job_type").map_err(|e| sql_err("row job_type", e))?)
            .map_err(|e| Error::Other(e.to_string()))?;
        let attempt: i32 = row.try_get("attempt").map_err(|e| sql_err("row attempt", e))?;
        let policy = RetryPolicy::for_job_type(job_type);

        if policy.should_retry(attempt as u32) {
            let delay = policy.delay_for_attempt(attempt as u32);
            let run_at: DateTime<Utc> = Utc::now() + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
            sqlx::query("UPDATE job_queue SET state = 'queued', error = $2, run_at = $3 WHERE id = $1")
                .bind(job_id)
                .bind(error)
                .bind(run_at)
                .execute(&self.pool)
                .await
                .map_err(|e| sql_err("job retry reschedule failed", e))?;
        } else {
            sqlx::query("UPDATE job_queue SET state = 'failed', error = $2 WHERE id = $1")
                .bind(job_id)
                .bind(error)
                .execute(&self.pool)
                .await
                .map_err(|e| sql_err("job dead-letter failed", e))?;
        }
        Ok(())
    }

    pub async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(
            "SELECT id, job_type, payload, state, attempt, result, error, dependencies FROM job_queue WHERE id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| sql_err("job lookup failed", e))?;
        row.as_ref().map(row_to_job).transpose()
    }
}

/// Looks up the current state of each dependency id, for the caller to pass
/// to [`dependencies_satisfied`]. A dependency not found in the table is
/// simply absent from the returned map, which `dependencies_satisfied`
/// already treats as not-yet-satisfied.
async fn completed_dependency_states(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    dependencies: &[Uuid],
) -> Result<std::collections::HashMap<Uuid, JobState>> {
    if dependencies.is_empty() {
        return Ok(std::collections::HashMap::new());
    }
    let rows = sqlx::query("SELECT id, state FROM job_queue WHERE id = ANY($1)")
        .bind(dependencies)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| sql_err("dependency state scan failed", e))?;
    let mut states = std::collections::HashMap::with_capacity(rows.len());
    for row in &rows {
        let id: Uuid = row.try_get("id").map_err(|e| sql_err("row id", e))?;
        let state: JobState = serde_json::from_value(row.try_get("state").map_err(|e| sql_err("row state", e))?)
            .map_err(|e| Error::Other(e.to_string()))?;
        states.insert(id, state);
    }
    Ok(states)
}

fn row_to_job(row: &sqlx::postgres::PgRow) -> Result<Job> {
    let job_type: JobType = serde_json::from_value(row.try_get("job_type").map_err(|e| sql_err("row job_type", e))?)
        .map_err(|e| Error::Other(e.to_string()))?;
    let state: JobState = serde_json::from_value(row.try_get("state").map_err(|e| sql_err("row state", e))?)
        .map_err(|e| Error::Other(e.to_string()))?;
    let attempt: i32 = row.try_get("attempt").map_err(|e| sql_err("row attempt", e))?;
    Ok(Job {
        id: row.try_get("id").map_err(|e| sql_err("row id", e))?,
        job_type,
        payload: row.try_get("payload").map_err(|e| sql_err("row payload", e))?,
        state,
        attempt: attempt as u32,
        result: row.try_get("result").map_err(|e| sql_err("row result", e))?,
        error: row.try_get("error").map_err(|e| sql_err("row error", e))?,
        dependencies: row.try_get("dependencies").map_err(|e| sql_err("row dependencies", e))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_state_round_trips_through_json_as_lowercase() {
        let value = serde_json::to_value(JobState::Queued).unwrap();
        assert_eq!(value, serde_json::json!("queued"));
        let back: JobState = serde_json::from_value(value).unwrap();
        assert_eq!(back, JobState::Queued);
    }

    #[test]
    fn job_type_round_trips_through_json_as_snake_case() {
        let value = serde_json::to_value(JobType::AudioTranscription).unwrap();
        assert_eq!(value, serde_json::json!("audio_transcription"));
    }
}
