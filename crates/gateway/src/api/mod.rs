pub mod auth;
pub mod credentials;
pub mod error;
pub mod health;
pub mod sessions;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub use error::ApiError;

/// Build the full API router.
///
/// Routes are split into **public** (no auth required) and **protected**
/// (gated behind the `HD_API_TOKEN` bearer-token middleware).
///
/// `state` is needed to wire up the auth middleware at build time.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/health", get(health::health));

    let upload_limit = state.config.server.max_upload_bytes;

    let protected = Router::new()
        .route("/v1/sessions", get(sessions::list_sessions))
        .route("/v1/sessions/start", post(sessions::start_session))
        .route("/v1/sessions/stop-all", post(sessions::stop_all_sessions))
        .route("/v1/sessions/:key/stop", post(sessions::stop_session))
        .route("/v1/sessions/:key/status", get(sessions::session_status))
        .route("/v1/sessions/:key/logs", get(sessions::session_logs))
        .route(
            "/v1/sessions/:key/credentials",
            post(credentials::upload_credentials)
                .delete(credentials::remove_credentials)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        // Apply API auth middleware to all protected routes.
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public.merge(protected)
}
