//! HTTP router.

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{AppState, routes};

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::home))
        .route("/login", get(routes::login_page))
        .route("/users/{id}", get(routes::profile))
        .route("/auth/github", get(routes::github_login))
        .route("/auth/github/callback", get(routes::github_callback))
        .route("/auth/google", get(routes::google_login))
        .route("/auth/google/callback", get(routes::google_callback))
        .route("/auth/logout", get(routes::logout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
