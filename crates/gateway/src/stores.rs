//! Entity lookups that have no other home: users, personas, personalities,
//! BYOK credentials, per-user personality overrides, and the denylist.
//!
//! Grounded on `relay_sessions::PgChannelStore`'s idiom (one pooled
//! resource, plain `sqlx::query`, a local `sql_err` helper, `Row::try_get`
//! mapping) — these are the remaining §3 entity tables that every other
//! crate's pipeline stage consumes by value but none of them persists.

use sqlx::{PgPool, Row};
use uuid::Uuid;

use relay_domain::error::{Error, Result};
use relay_domain::types::{
    CredentialType, DenylistEntry, DenylistScope, DenylistTargetType, LlmConfigOverride, Persona,
    Personality, SystemPromptTemplate, User, UserCredential, UserPersonalityConfig, Visibility,
};

fn sql_err(context: &str, e: sqlx::Error) -> Error {
    Error::Other(format!("{context}: {e}"))
}

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, external_id, default_persona_handle FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| sql_err("user lookup failed", e))?;
        row.map(|r| {
            Ok(User {
                id: r.try_get("id").map_err(|e| sql_err("row id", e))?,
                external_id: r.try_get("external_id").map_err(|e| sql_err("row external_id", e))?,
                default_persona_handle: r
                    .try_get("default_persona_handle")
                    .map_err(|e| sql_err("row default_persona_handle", e))?,
            })
        })
        .transpose()
    }
}

pub struct PgPersonaStore {
    pool: PgPool,
}

fn row_to_persona(row: &sqlx::postgres::PgRow) -> Result<Persona> {
    Ok(Persona {
        id: row.try_get("id").map_err(|e| sql_err("row id", e))?,
        owner_id: row.try_get("owner_id").map_err(|e| sql_err("row owner_id", e))?,
        name: row.try_get("name").map_err(|e| sql_err("row name", e))?,
        preferred_name: row.try_get("preferred_name").map_err(|e| sql_err("row preferred_name", e))?,
        pronouns: row.try_get("pronouns").map_err(|e| sql_err("row pronouns", e))?,
        description: row.try_get("description").map_err(|e| sql_err("row description", e))?,
        share_ltm_across_personalities: row
            .try_get("share_ltm_across_personalities")
            .map_err(|e| sql_err("row share_ltm_across_personalities", e))?,
    })
}

impl PgPersonaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, persona_id: Uuid) -> Result<Option<Persona>> {
        let row = sqlx::query(
            "SELECT id, owner_id, name, preferred_name, pronouns, description, share_ltm_across_personalities \
             FROM personas WHERE id = $1",
        )
        .bind(persona_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| sql_err("persona lookup failed", e))?;
        row.as_ref().map(row_to_persona).transpose()
    }

    /// Fetches every persona a user might resolve to: its own personas plus
    /// whatever `persona_ids` stage 2/3 already named, so callers can build
    /// the `HashMap` `relay_sessions::PersonaResolver::resolve` needs
    /// without a per-candidate round trip.
    pub async fn get_many(&self, persona_ids: &[Uuid]) -> Result<Vec<Persona>> {
        if persona_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT id, owner_id, name, preferred_name, pronouns, description, share_ltm_across_personalities \
             FROM personas WHERE id = ANY($1)",
        )
        .bind(persona_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| sql_err("persona batch lookup failed", e))?;
        rows.iter().map(row_to_persona).collect()
    }

    /// The user's own default persona plus the persona linked to every
    /// personality they've customized — the candidate set `PersonaResolver`
    /// needs to check `share_ltm_across_personalities` on its first guess.
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Persona>> {
        let rows = sqlx::query(
            "SELECT id, owner_id, name, preferred_name, pronouns, description, share_ltm_across_personalities \
             FROM personas WHERE owner_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| sql_err("persona list failed", e))?;
        rows.iter().map(row_to_persona).collect()
    }
}

fn visibility_str(v: Visibility) -> &'static str {
    match v {
        Visibility::Public => "public",
        Visibility::Private => "private",
    }
}

fn parse_visibility(raw: &str) -> Visibility {
    match raw {
        "private" => Visibility::Private,
        _ => Visibility::Public,
    }
}

fn row_to_personality(row: &sqlx::postgres::PgRow) -> Result<Personality> {
    let template_json: serde_json::Value = row.try_get("system_prompt_template").map_err(|e| sql_err("row system_prompt_template", e))?;
    let system_prompt_template: SystemPromptTemplate =
        serde_json::from_value(template_json).map_err(|e| Error::Other(e.to_string()))?;
    let visibility_str: String = row.try_get("visibility").map_err(|e| sql_err("row visibility", e))?;
    Ok(Personality {
        id: row.try_get("id").map_err(|e| sql_err("row id", e))?,
        slug: row.try_get("slug").map_err(|e| sql_err("row slug", e))?,
        display_name: row.try_get("display_name").map_err(|e| sql_err("row display_name", e))?,
        system_prompt_template,
        model: row.try_get("model").map_err(|e| sql_err("row model", e))?,
        vision_model: row.try_get("vision_model").map_err(|e| sql_err("row vision_model", e))?,
        temperature: row.try_get("temperature").map_err(|e| sql_err("row temperature", e))?,
        max_tokens: row.try_get::<i32, _>("max_tokens").map_err(|e| sql_err("row max_tokens", e))? as u32,
        context_window: row.try_get::<i32, _>("context_window").map_err(|e| sql_err("row context_window", e))? as u32,
        visibility: parse_visibility(&visibility_str),
        owner_id: row.try_get("owner_id").map_err(|e| sql_err("row owner_id", e))?,
        co_owner_ids: row.try_get("co_owner_ids").map_err(|e| sql_err("row co_owner_ids", e))?,
        avatar_blob: row.try_get("avatar_blob").map_err(|e| sql_err("row avatar_blob", e))?,
    })
}

pub struct PgPersonalityStore {
    pool: PgPool,
}

impl PgPersonalityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, personality_id: Uuid) -> Result<Option<Personality>> {
        let row = sqlx::query(
            "SELECT id, slug, display_name, system_prompt_template, model, vision_model, temperature, \
             max_tokens, context_window, visibility, owner_id, co_owner_ids, avatar_blob \
             FROM personalities WHERE id = $1",
        )
        .bind(personality_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| sql_err("personality lookup failed", e))?;
        row.as_ref().map(row_to_personality).transpose()
    }

    #[allow(dead_code)]
    pub fn visibility_column_value(v: Visibility) -> &'static str {
        visibility_str(v)
    }
}

pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The user's bring-your-own credential for `service`, or `None` if
    /// they haven't configured one — stage 3 (`relay_providers::auth::
    /// resolve_auth`) treats that identically to an expired one.
    pub async fn get(&self, owner_id: Uuid, service: &str) -> Result<Option<UserCredential>> {
        let row = sqlx::query(
            "SELECT owner_id, service, credential_type, ciphertext, iv, auth_tag, expires_at \
             FROM user_credentials WHERE owner_id = $1 AND service = $2",
        )
        .bind(owner_id)
        .bind(service)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| sql_err("credential lookup failed", e))?;

        row.map(|r| {
            let credential_type_str: String = r.try_get("credential_type").map_err(|e| sql_err("row credential_type", e))?;
            Ok(UserCredential {
                owner_id: r.try_get("owner_id").map_err(|e| sql_err("row owner_id", e))?,
                service: r.try_get("service").map_err(|e| sql_err("row service", e))?,
                credential_type: match credential_type_str.as_str() {
                    "oauth_token" => CredentialType::OAuthToken,
                    _ => CredentialType::ApiKey,
                },
                ciphertext: r.try_get("ciphertext").map_err(|e| sql_err("row ciphertext", e))?,
                iv: r.try_get("iv").map_err(|e| sql_err("row iv", e))?,
                auth_tag: r.try_get("auth_tag").map_err(|e| sql_err("row auth_tag", e))?,
                expires_at: r.try_get("expires_at").map_err(|e| sql_err("row expires_at", e))?,
            })
        })
        .transpose()
    }
}

pub struct PgUserPersonalityConfigStore {
    pool: PgPool,
}

impl PgUserPersonalityConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: Uuid, personality_id: Uuid) -> Result<Option<UserPersonalityConfig>> {
        let row = sqlx::query(
            "SELECT user_id, personality_id, persona_override, llm_config_override \
             FROM user_personality_configs WHERE user_id = $1 AND personality_id = $2",
        )
        .bind(user_id)
        .bind(personality_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| sql_err("user personality config lookup failed", e))?;

        row.map(|r| {
            let llm_override_json: Option<serde_json::Value> =
                r.try_get("llm_config_override").map_err(|e| sql_err("row llm_config_override", e))?;
            let llm_config_override = llm_override_json
                .map(|v| serde_json::from_value::<LlmConfigOverride>(v).map_err(|e| Error::Other(e.to_string())))
                .transpose()?;
            Ok(UserPersonalityConfig {
                user_id: r.try_get("user_id").map_err(|e| sql_err("row user_id", e))?,
                personality_id: r.try_get("personality_id").map_err(|e| sql_err("row personality_id", e))?,
                persona_override: r.try_get("persona_override").map_err(|e| sql_err("row persona_override", e))?,
                llm_config_override,
            })
        })
        .transpose()
    }
}

/// §3 CRUD over the denylist, keyed by the entry's natural identity
/// `(discord_id, scope, scope_id)` — there is no surrogate id, the triple
/// already uniquely names one rule.
pub struct PgDenylistStore {
    pool: PgPool,
}

fn target_type_str(t: DenylistTargetType) -> &'static str {
    match t {
        DenylistTargetType::User => "USER",
        DenylistTargetType::Guild => "GUILD",
    }
}

fn parse_target_type(raw: &str) -> DenylistTargetType {
    match raw {
        "GUILD" => DenylistTargetType::Guild,
        _ => DenylistTargetType::User,
    }
}

fn scope_str(s: DenylistScope) -> &'static str {
    match s {
        DenylistScope::Bot => "BOT",
        DenylistScope::Guild => "GUILD",
        DenylistScope::Channel => "CHANNEL",
    }
}

fn parse_scope(raw: &str) -> DenylistScope {
    match raw {
        "BOT" => DenylistScope::Bot,
        "CHANNEL" => DenylistScope::Channel,
        _ => DenylistScope::Guild,
    }
}

impl PgDenylistStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn add(&self, entry: &DenylistEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO denylist_entries (target_type, discord_id, scope, scope_id, reason, added_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (discord_id, scope, scope_id) DO UPDATE SET reason = EXCLUDED.reason
            "#,
        )
        .bind(target_type_str(entry.target_type))
        .bind(&entry.discord_id)
        .bind(scope_str(entry.scope))
        .bind(&entry.scope_id)
        .bind(&entry.reason)
        .bind(entry.added_by)
        .execute(&self.pool)
        .await
        .map_err(|e| sql_err("denylist insert failed", e))?;
        Ok(())
    }

    pub async fn remove(&self, discord_id: &str, scope: DenylistScope, scope_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM denylist_entries WHERE discord_id = $1 AND scope = $2 AND scope_id = $3")
            .bind(discord_id)
            .bind(scope_str(scope))
            .bind(scope_id)
            .execute(&self.pool)
            .await
            .map_err(|e| sql_err("denylist delete failed", e))?;
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<DenylistEntry>> {
        let rows = sqlx::query("SELECT target_type, discord_id, scope, scope_id, reason, added_by FROM denylist_entries")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| sql_err("denylist list failed", e))?;
        rows.iter()
            .map(|r| {
                let target_type_raw: String = r.try_get("target_type").map_err(|e| sql_err("row target_type", e))?;
                let scope_raw: String = r.try_get("scope").map_err(|e| sql_err("row scope", e))?;
                Ok(DenylistEntry {
                    target_type: parse_target_type(&target_type_raw),
                    discord_id: r.try_get("discord_id").map_err(|e| sql_err("row discord_id", e))?,
                    scope: parse_scope(&scope_raw),
                    scope_id: r.try_get("scope_id").map_err(|e| sql_err("row scope_id", e))?,
                    reason: r.try_get("reason").map_err(|e| sql_err("row reason", e))?,
                    added_by: r.try_get("added_by").map_err(|e| sql_err("row added_by", e))?,
                })
            })
            .collect()
    }
}
