//! `PgChannelStore` — the activated-channel registry (spec §3
//! `ActivatedChannel`/`ChannelSettings`), backed by Postgres.
//!
//! Grounded on the teacher's `SessionStore`: one pooled resource, keyed
//! lookup plus resolve-or-create plus update, generalized from a JSON file
//! keyed by session key to a table keyed by channel id, the same way
//! `relay_memory::PgMemoryStore` generalized `RestSerialMemoryClient` from
//! HTTP to SQL.
//!
//! `ChannelSettings` is stored as a single JSONB column rather than
//! unpacked into its own columns: it is read and written as a whole by
//! every caller (config resolution overlays it wholesale), so there is no
//! per-field query to optimize for, unlike `memories.provenance`.

use sqlx::{PgPool, Row};
use uuid::Uuid;

use relay_domain::error::{Error, Result};
use relay_domain::types::ActivatedChannel;

pub struct PgChannelStore {
    pool: PgPool,
}

fn sql_err(context: &str, e: sqlx::Error) -> Error {
    Error::Other(format!("{context}: {e}"))
}

impl PgChannelStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, channel_id: &str) -> Result<Option<ActivatedChannel>> {
        let row = sqlx::query(
            "SELECT channel_id, guild_id, settings, creator_id FROM activated_channels WHERE channel_id = $1",
        )
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| sql_err("activated channel lookup failed", e))?;

        row.map(|r| row_to_channel(&r)).transpose()
    }

    /// Inserts the channel if absent, or overwrites its `settings`/`guild_id`
    /// if present. `creator_id` is fixed at first activation and never
    /// updated by a later call.
    pub async fn upsert(&self, channel: &ActivatedChannel) -> Result<()> {
        let settings = serde_json::to_value(&channel.settings).map_err(|e| Error::Other(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO activated_channels (channel_id, guild_id, settings, creator_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (channel_id)
            DO UPDATE SET guild_id = EXCLUDED.guild_id, settings = EXCLUDED.settings
            "#,
        )
        .bind(&channel.channel_id)
        .bind(&channel.guild_id)
        .bind(settings)
        .bind(channel.creator_id)
        .execute(&self.pool)
        .await
        .map_err(|e| sql_err("activated channel upsert failed", e))?;
        Ok(())
    }

    pub async fn delete(&self, channel_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM activated_channels WHERE channel_id = $1")
            .bind(channel_id)
            .execute(&self.pool)
            .await
            .map_err(|e| sql_err("activated channel delete failed", e))?;
        Ok(())
    }

    pub async fn list_for_guild(&self, guild_id: &str) -> Result<Vec<ActivatedChannel>> {
        let rows = sqlx::query(
            "SELECT channel_id, guild_id, settings, creator_id FROM activated_channels WHERE guild_id = $1",
        )
        .bind(guild_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| sql_err("activated channel list failed", e))?;

        rows.iter().map(row_to_channel).collect()
    }
}

fn row_to_channel(row: &sqlx::postgres::PgRow) -> Result<ActivatedChannel> {
    let settings_json: serde_json::Value = row.try_get("settings").map_err(|e| sql_err("row settings", e))?;
    Ok(ActivatedChannel {
        channel_id: row.try_get("channel_id").map_err(|e| sql_err("row channel_id", e))?,
        guild_id: row.try_get("guild_id").map_err(|e| sql_err("row guild_id", e))?,
        settings: serde_json::from_value(settings_json).map_err(|e| Error::Other(e.to_string()))?,
        creator_id: row.try_get("creator_id").map_err(|e| sql_err("row creator_id", e))?,
    })
}
