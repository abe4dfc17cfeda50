//! `GET /health` and `GET /metrics` — public, no service-to-service
//! authentication (spec §6).

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let db_reachable = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();
    let redis_reachable = state.kv.get("health:ping").await.is_ok();

    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "inferredStopSequenceActivations": relay_pipeline::INFERRED_STOP_SEQUENCE_COUNT.load(std::sync::atomic::Ordering::Relaxed),
        "dependencies": {
            "database": db_reachable,
            "redis": redis_reachable,
        },
    }))
}
