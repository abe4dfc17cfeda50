pub mod admin;
pub mod channels;
pub mod generate;
pub mod health;
pub mod response;

use axum::middleware;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::services::ServeDir;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (no auth) and **protected** (gated
/// behind `crate::auth::require_service_token`, spec §6: "(all others)
/// require service-to-service authentication header").
pub fn router(state: AppState) -> Router<AppState> {
    let avatars_dir = state.config.storage.avatars_dir.clone();

    let public = Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .nest_service("/avatars", ServeDir::new(avatars_dir));

    let protected = Router::new()
        // Generation jobs
        .route("/ai/generate", post(generate::submit_generate))
        .route("/ai/transcribe", post(generate::submit_transcribe))
        .route("/ai/job/:jobId", get(generate::get_job))
        .route("/ai/job/:jobId/confirm-delivery", post(generate::confirm_delivery))
        // Activated channels
        .route("/user/channel/list", get(channels::list_channels))
        .route("/user/channel/:id/config-overrides", patch(channels::patch_config_overrides))
        .route("/user/channel/:id/config-overrides", delete(channels::delete_config_overrides))
        // Denylist / admin
        .route("/admin/denylist", get(admin::list_denylist))
        .route("/admin/denylist", post(admin::add_denylist_entry))
        .route("/admin/denylist/:discordId", delete(admin::remove_denylist_entry))
        .route("/admin/stop-sequences", get(admin::stop_sequence_telemetry))
        .route_layer(middleware::from_fn_with_state(state, crate::auth::require_service_token));

    public.merge(protected).layer(tower_http::trace::TraceLayer::new_for_http())
}
