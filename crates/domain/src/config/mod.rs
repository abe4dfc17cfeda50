//! Layered configuration: defaults, overlaid by the recognized environment
//! variables from spec §6. Validated at startup via `Config::validate()`,
//! which returns warnings/errors rather than panicking — the CLI's `doctor`
//! and `config validate` subcommands surface these to the operator.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "d_redis_url")]
    pub redis_url: String,
    /// Safety-net TTL for per-process hot caches (§4.4); production default
    /// is 60s, lowered under test via `RELAY_CACHE_TTL_SECS`.
    #[serde(default = "d_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "d_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,
}

fn d_redis_url() -> String {
    String::new()
}
fn d_cache_ttl_secs() -> u64 {
    60
}
fn d_dedup_ttl_secs() -> u64 {
    30
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: d_redis_url(),
            cache_ttl_secs: d_cache_ttl_secs(),
            dedup_ttl_secs: d_dedup_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "d_database_url")]
    pub database_url: String,
}

fn d_database_url() -> String {
    String::new()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: d_database_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecurityConfig {
    /// Absent disables BYOK (guest mode only); present must be 64 hex chars.
    pub api_key_encryption_key: Option<String>,
    /// Absent means service-to-service auth is unenforced; warned, not
    /// errored, so `doctor` can run against a dev stack without one.
    pub internal_service_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Used to build attachment staging URLs (§4.1); falls back to
    /// `GATEWAY_URL` if `PUBLIC_GATEWAY_URL` is unset.
    #[serde(default)]
    pub public_gateway_url: Option<String>,
}

fn d_host() -> String {
    "0.0.0.0".into()
}
fn d_port() -> u16 {
    8080
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            cors_origins: Vec::new(),
            public_gateway_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeEnv {
    #[default]
    Production,
    Development,
    Test,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "d_avatars_dir")]
    pub avatars_dir: String,
    #[serde(default = "d_temp_attachments_dir")]
    pub temp_attachments_dir: String,
}

fn d_avatars_dir() -> String {
    "/data/avatars".into()
}
fn d_temp_attachments_dir() -> String {
    "/data/temp-attachments".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            avatars_dir: d_avatars_dir(),
            temp_attachments_dir: d_temp_attachments_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub node_env: NodeEnv,
}

impl Config {
    /// Build a `Config` from defaults overlaid by the recognized env vars
    /// (spec §6). A `toml` file, if present, is applied as the base layer by
    /// the caller before this; this function only performs the env overlay.
    pub fn apply_env(mut self, get: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = get("REDIS_URL") {
            self.cache.redis_url = v;
        }
        if let Some(v) = get("DATABASE_URL") {
            self.database.database_url = v;
        }
        if let Some(v) = get("API_KEY_ENCRYPTION_KEY") {
            self.security.api_key_encryption_key = Some(v);
        }
        if let Some(v) = get("INTERNAL_SERVICE_SECRET") {
            self.security.internal_service_secret = Some(v);
        }
        if let Some(v) = get("CORS_ORIGINS") {
            self.http.cors_origins = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Some(v) = get("PUBLIC_GATEWAY_URL").or_else(|| get("GATEWAY_URL")) {
            self.http.public_gateway_url = Some(v);
        }
        if let Some(v) = get("NODE_ENV") {
            self.node_env = match v.as_str() {
                "development" => NodeEnv::Development,
                "test" => NodeEnv::Test,
                _ => NodeEnv::Production,
            };
        }
        self
    }

    /// Validate the configuration; returns an empty vec when everything
    /// looks good. Mirrors the severity-tagged `ConfigError` convention this
    /// workspace's config layer uses throughout.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.cache.redis_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "REDIS_URL".into(),
                message: "required, but unset".into(),
            });
        }
        if self.database.database_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "DATABASE_URL".into(),
                message: "required, but unset".into(),
            });
        }
        if self.security.internal_service_secret.is_none() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "INTERNAL_SERVICE_SECRET".into(),
                message: "unset; service-to-service auth is unenforced".into(),
            });
        }
        if let Some(key) = &self.security.api_key_encryption_key {
            if let Err(e) = crate::crypto::validate_key_hex(key) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "API_KEY_ENCRYPTION_KEY".into(),
                    message: e.to_string(),
                });
            }
        } else {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "API_KEY_ENCRYPTION_KEY".into(),
                message: "unset; BYOK is disabled, all requests run in guest mode".into(),
            });
        }
        if self.http.public_gateway_url.is_none() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "PUBLIC_GATEWAY_URL".into(),
                message: "unset; attachment staging URLs cannot be built".into(),
            });
        }

        errors
    }
}
