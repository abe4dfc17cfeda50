//! Service-to-service authentication middleware (spec §6: "(all others)
//! require service-to-service authentication header").
//!
//! Reads `INTERNAL_SERVICE_SECRET` once at startup and caches its SHA-256
//! digest in `AppState`. If the secret is unset the server runs in dev mode
//! and every protected route is open — `Config::validate` already warns an
//! operator about that configuration.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

pub async fn require_service_token(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let expected_hash = match &state.service_token_hash {
        Some(h) => h,
        None => return next.run(req).await,
    };

    let provided = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    let provided_hash = Sha256::digest(provided.as_bytes());

    if !bool::from(provided_hash.ct_eq(expected_hash.as_slice())) {
        return (
            axum::http::StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({
                "error": "UNAUTHORIZED",
                "message": "missing or invalid service-to-service authentication header",
                "timestamp": relay_domain::error::now_millis(),
            })),
        )
            .into_response();
    }

    next.run(req).await
}
