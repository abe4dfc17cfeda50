//! Response envelope (spec §6): `{ jobId, requestId?, status }` on success,
//! `{ error, message, requestId?, timestamp }` on failure. Status codes
//! derive from the error category (spec §7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use relay_domain::error::{now_millis, reference_id, ErrorCategory};

#[derive(Debug, Serialize)]
pub struct SuccessEnvelope {
    pub job_id: Option<Uuid>,
    pub request_id: Option<Uuid>,
    pub status: String,
}

impl IntoResponse for SuccessEnvelope {
    fn into_response(self) -> Response {
        (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "jobId": self.job_id,
                "requestId": self.request_id,
                "status": self.status,
            })),
        )
            .into_response()
    }
}

/// A handful of request-shape failures (not-found, service-unavailable)
/// have no corresponding pipeline failure category (spec §7 only
/// classifies upstream/generation errors); `Other` carries an explicit
/// code and status for those.
#[derive(Debug)]
pub enum ApiErrorKind {
    Category(ErrorCategory),
    Other { code: &'static str, status: u16 },
}

/// Every terminal error gets a 12-char reference id for support
/// correlation (spec §4.3, §7).
#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
    pub request_id: Option<Uuid>,
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self { kind: ApiErrorKind::Category(category), message: message.into(), request_id: None, retry_after_secs: None }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Auth, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Other { code: "NOT_FOUND", status: 404 },
            message: message.into(),
            request_id: None,
            retry_after_secs: None,
        }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Other { code: "SERVICE_UNAVAILABLE", status: 503 },
            message: message.into(),
            request_id: None,
            retry_after_secs: None,
        }
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self {
            kind: ApiErrorKind::Category(ErrorCategory::RateLimit),
            message: "too many requests".into(),
            request_id: None,
            retry_after_secs: Some(retry_after_secs),
        }
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    fn code(&self) -> &'static str {
        match self.kind {
            ApiErrorKind::Other { code, .. } => code,
            ApiErrorKind::Category(category) => match category {
                ErrorCategory::Validation => "VALIDATION_ERROR",
                ErrorCategory::Auth => "UNAUTHORIZED",
                ErrorCategory::RateLimit => "RATE_LIMITED",
                ErrorCategory::Quota => "QUOTA_EXCEEDED",
                ErrorCategory::ContentPolicy => "CONTENT_POLICY",
                ErrorCategory::ContextWindow => "CONTEXT_WINDOW",
                ErrorCategory::ModelNotFound => "MODEL_NOT_FOUND",
                ErrorCategory::Timeout => "TIMEOUT",
                ErrorCategory::ServerError => "SERVER_ERROR",
                ErrorCategory::Network => "NETWORK_ERROR",
                ErrorCategory::EmptyResponse => "EMPTY_RESPONSE",
                ErrorCategory::Censored => "CENSORED",
                ErrorCategory::SdkParsing => "SDK_PARSING",
                ErrorCategory::Unknown => "UNKNOWN",
            },
        }
    }

    fn status(&self) -> u16 {
        match self.kind {
            ApiErrorKind::Other { status, .. } => status,
            ApiErrorKind::Category(category) => category.http_status(),
        }
    }
}

impl From<relay_domain::Error> for ApiError {
    fn from(e: relay_domain::Error) -> Self {
        let category = ErrorCategory::classify(None, &e.to_string());
        ApiError::new(category, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let reference = reference_id();
        tracing::warn!(code = self.code(), reference = %reference, message = %self.message, "request failed");

        let mut body = serde_json::json!({
            "error": self.code(),
            "message": self.message,
            "requestId": self.request_id,
            "timestamp": now_millis(),
            "referenceId": reference,
        });
        if let Some(retry_after) = self.retry_after_secs {
            body["retryAfter"] = serde_json::json!(retry_after);
        }
        (status, Json(body)).into_response()
    }
}
