//! Shared error type and the failure-category taxonomy.
//!
//! The taxonomy mirrors the categories a caught provider/queue error is
//! classified into: each carries a `permanent`/`transient` disposition that
//! determines whether the job queue retries it (see `relay-queue`).

use std::time::{SystemTime, UNIX_EPOCH};

/// Crate-wide error type. Kept small and `thiserror`-derived like every
/// other leaf crate in this workspace; richer context is attached by the
/// higher layers (the pipeline wraps this in `PipelineError`).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure category, per spec §4.3 / §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    Validation,
    Auth,
    RateLimit,
    Quota,
    ContentPolicy,
    ContextWindow,
    ModelNotFound,
    Timeout,
    ServerError,
    Network,
    EmptyResponse,
    Censored,
    SdkParsing,
    Unknown,
}

/// Whether the queue should retry a job that failed with this category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Permanent,
    Transient,
}

impl ErrorCategory {
    pub fn disposition(self) -> Disposition {
        use ErrorCategory::*;
        match self {
            Validation | Auth | Quota | ContextWindow | ModelNotFound => Disposition::Permanent,
            RateLimit | ContentPolicy | Timeout | ServerError | Network | EmptyResponse
            | Censored | SdkParsing | Unknown => Disposition::Transient,
        }
    }

    pub fn is_permanent(self) -> bool {
        self.disposition() == Disposition::Permanent
    }

    /// HTTP status code this category should surface at the ingress boundary.
    pub fn http_status(self) -> u16 {
        use ErrorCategory::*;
        match self {
            Validation => 400,
            Auth => 401,
            RateLimit => 429,
            Quota => 402,
            ContentPolicy | Censored | EmptyResponse => 422,
            ContextWindow => 400,
            ModelNotFound => 404,
            Timeout | Network | ServerError | SdkParsing | Unknown => 500,
        }
    }

    /// Classify an upstream error from (status code, message) per spec §4.3:
    /// an HTTP status, if present, dominates; otherwise regex-driven message
    /// classification; otherwise known network error codes.
    pub fn classify(status: Option<u16>, message: &str) -> Self {
        if let Some(code) = status {
            return Self::classify_status(code, message);
        }
        Self::classify_message(message)
    }

    fn classify_status(code: u16, message: &str) -> Self {
        match code {
            400 => {
                if context_window_re().is_match(message) {
                    ErrorCategory::ContextWindow
                } else {
                    ErrorCategory::Validation
                }
            }
            401 | 403 => ErrorCategory::Auth,
            402 => ErrorCategory::Quota,
            404 => ErrorCategory::ModelNotFound,
            408 => ErrorCategory::Timeout,
            422 => {
                if censored_re().is_match(message) {
                    ErrorCategory::Censored
                } else {
                    ErrorCategory::ContentPolicy
                }
            }
            429 => ErrorCategory::RateLimit,
            500..=599 => ErrorCategory::ServerError,
            _ => ErrorCategory::Unknown,
        }
    }

    fn classify_message(message: &str) -> Self {
        if quota_re().is_match(message) {
            ErrorCategory::Quota
        } else if context_window_re().is_match(message) {
            ErrorCategory::ContextWindow
        } else if censored_re().is_match(message) {
            ErrorCategory::Censored
        } else if content_policy_re().is_match(message) {
            ErrorCategory::ContentPolicy
        } else if empty_response_re().is_match(message) {
            ErrorCategory::EmptyResponse
        } else if model_not_found_re().is_match(message) {
            ErrorCategory::ModelNotFound
        } else if timeout_re().is_match(message) {
            ErrorCategory::Timeout
        } else if network_code_re().is_match(message) {
            ErrorCategory::Network
        } else if sdk_parsing_re().is_match(message) {
            ErrorCategory::SdkParsing
        } else {
            ErrorCategory::Unknown
        }
    }
}

fn quota_re() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"(?i)quota|insufficient_quota|billing").unwrap())
}
fn context_window_re() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"(?i)context.length|maximum context|too many tokens|context_length_exceeded")
            .unwrap()
    })
}
fn censored_re() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"(?i)censored|flagged by").unwrap())
}
fn content_policy_re() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"(?i)content.policy|content_filter|safety").unwrap())
}
fn empty_response_re() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"(?i)empty response|no content returned").unwrap())
}
fn model_not_found_re() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"(?i)model not found|unknown model|no such model").unwrap())
}
fn timeout_re() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"(?i)timed? ?out").unwrap())
}
fn sdk_parsing_re() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"(?i)failed to parse|unexpected token|invalid json").unwrap())
}
fn network_code_re() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"ECONNRESET|ETIMEDOUT|ECONNREFUSED|ENOTFOUND|EHOSTUNREACH|EPIPE").unwrap())
}

/// 12-character opaque reference id for support correlation (spec §7 / GLOSSARY).
///
/// Derived from a fresh random UUID, base32-encoded and truncated — cheap,
/// collision-resistant enough for log correlation, and URL-safe.
pub fn reference_id() -> String {
    let id = uuid::Uuid::new_v4();
    let encoded = base32::encode(base32::Alphabet::Crockford, id.as_bytes());
    encoded.to_ascii_lowercase().chars().take(12).collect()
}

/// Monotonic-ish millisecond timestamp used only for diagnostics fields
/// that aren't part of any persisted invariant (e.g. log correlation).
pub fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
