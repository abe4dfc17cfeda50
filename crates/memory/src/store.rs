//! `PgMemoryStore` — the long-term-memory vector index, backed by
//! Postgres + `pgvector`.
//!
//! Grounded on the teacher's `RestSerialMemoryClient`: a single pooled
//! client built once and reused for the process lifetime, every trait
//! method translated into one outbound call. The transport changes from
//! HTTP to SQL because this core owns its memory store directly rather
//! than delegating to an external SerialMemory service, but the "thin
//! typed wrapper around one pooled client" shape is unchanged.
//!
//! Query filters (persona id, personality id, channel id) are kept as
//! indexed columns alongside the `provenance` JSONB blob rather than
//! requiring a JSONB index traversal per query — the blob remains the
//! full record, the columns exist purely to make stage 5's filters cheap.
//!
//! Queries use `sqlx::query` (runtime-checked) rather than the `query!`
//! macro: the macro requires a live database at build time to verify
//! column types, which this workspace cannot assume.

use pgvector::Vector;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use relay_domain::error::{Error, Result};
use relay_domain::types::{Memory, MemoryScope, PendingMemory};

use crate::provider::MemoryStore;
use crate::types::{InsertOutcome, RetrievedMemory, SimilarityQuery};

pub struct PgMemoryStore {
    pool: PgPool,
}

impl PgMemoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn scope_str(scope: MemoryScope) -> &'static str {
    match scope {
        MemoryScope::Global => "global",
        MemoryScope::Personal => "personal",
        MemoryScope::Session => "session",
    }
}

fn parse_scope(raw: &str) -> MemoryScope {
    match raw {
        "global" => MemoryScope::Global,
        "session" => MemoryScope::Session,
        _ => MemoryScope::Personal,
    }
}

fn sql_err(context: &str, e: sqlx::Error) -> Error {
    Error::Other(format!("{context}: {e}"))
}

const SIMILARITY_QUERY: &str = r#"
    SELECT id, text, scope, created_at, 1 - (embedding <=> $1) AS score
    FROM memories
    WHERE persona_id = $2
      AND ($3::uuid IS NULL OR personality_id = $3)
      AND ($4::text IS NULL OR channel_id = $4)
      AND ($5::timestamptz IS NULL OR created_at <= $5)
      AND NOT (id = ANY($6))
      AND 1 - (embedding <=> $1) >= $7
    ORDER BY embedding <=> $1
    LIMIT $8
"#;

#[async_trait::async_trait]
impl MemoryStore for PgMemoryStore {
    async fn query_similar(&self, query: &SimilarityQuery) -> Result<Vec<RetrievedMemory>> {
        let embedding = Vector::from(query.embedding.clone());
        let rows = sqlx::query(SIMILARITY_QUERY)
            .bind(embedding)
            .bind(query.persona_id)
            .bind(query.personality_id)
            .bind(&query.channel_id)
            .bind(query.exclude_newer_than)
            .bind(&query.exclude_ids)
            .bind(query.score_threshold)
            .bind(query.limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| sql_err("memory similarity query failed", e))?;

        rows.into_iter()
            .map(|row| {
                Ok(RetrievedMemory {
                    id: row.try_get("id").map_err(|e| sql_err("row id", e))?,
                    text: row.try_get("text").map_err(|e| sql_err("row text", e))?,
                    scope: parse_scope(row.try_get::<String, _>("scope").map_err(|e| sql_err("row scope", e))?.as_str()),
                    score: row.try_get::<Option<f64>, _>("score").map_err(|e| sql_err("row score", e))?.unwrap_or(0.0),
                    created_at: row.try_get("created_at").map_err(|e| sql_err("row created_at", e))?,
                })
            })
            .collect()
    }

    async fn insert_memory(&self, memory: &Memory) -> Result<InsertOutcome> {
        let persona_id = memory
            .provenance
            .get("personaId")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());
        let personality_id = memory
            .provenance
            .get("personalityId")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());
        let channel_id = memory
            .provenance
            .get("channelId")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let embedding = Vector::from(memory.embedding.clone());

        let result = sqlx::query(
            r#"
            INSERT INTO memories (id, text, embedding, scope, persona_id, personality_id, channel_id, created_at, provenance)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(memory.id)
        .bind(&memory.text)
        .bind(embedding)
        .bind(scope_str(memory.scope))
        .bind(persona_id)
        .bind(personality_id)
        .bind(channel_id)
        .bind(memory.created_at)
        .bind(&memory.provenance)
        .execute(&self.pool)
        .await
        .map_err(|e| sql_err("memory insert failed", e))?;

        Ok(if result.rows_affected() == 1 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::AlreadyExists
        })
    }

    async fn create_pending(&self, pending: &PendingMemory) -> Result<()> {
        let embedding = Vector::from(pending.embedding.clone());
        sqlx::query(
            r#"
            INSERT INTO pending_memories (id, text, embedding, scope, created_at, provenance, attempts, last_error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(pending.id)
        .bind(&pending.text)
        .bind(embedding)
        .bind(scope_str(pending.scope))
        .bind(pending.created_at)
        .bind(&pending.provenance)
        .bind(pending.attempts as i32)
        .bind(&pending.last_error)
        .execute(&self.pool)
        .await
        .map_err(|e| sql_err("pending memory create failed", e))?;
        Ok(())
    }

    async fn delete_pending(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM pending_memories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| sql_err("pending memory delete failed", e))?;
        Ok(())
    }

    async fn mark_pending_failed(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query("UPDATE pending_memories SET attempts = attempts + 1, last_error = $2 WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(&self.pool)
            .await
            .map_err(|e| sql_err("pending memory update failed", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_round_trips_through_its_string_form() {
        for scope in [MemoryScope::Global, MemoryScope::Personal, MemoryScope::Session] {
            assert_eq!(parse_scope(scope_str(scope)), scope);
        }
    }

    #[test]
    fn unknown_scope_string_falls_back_to_personal() {
        assert_eq!(parse_scope("bogus"), MemoryScope::Personal);
    }
}
