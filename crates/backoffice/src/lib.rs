//! Table 1837 back office library.
//!
//! Server-rendered back office for the Table 1837 bar: staff sign in against
//! the hosted identity provider, see the tabs their role allows, and work from
//! a daily dashboard whose 86'd list refreshes live.
//!
//! The binary in `main.rs` wires configuration, logging and Sentry around
//! [`app`]. Tests build the same router over in-memory backends.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod components;
pub mod config;
pub mod error;
pub mod filters;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::{Router, extract::State, http::StatusCode, routing::get};
use tower_http::services::ServeDir;

use middleware::{create_session_layer, request_id_middleware, security_headers_middleware};
use state::AppState;

/// Static assets, relative to the workspace root.
pub const STATIC_DIR: &str = "crates/backoffice/static";

/// Build the application router with its middleware stack.
///
/// Tracing and Sentry layers are added by the binary.
pub fn app(state: AppState) -> Router {
    let session_layer = create_session_layer(state.config());

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes::routes(&state))
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .layer(session_layer)
        .layer(axum::middleware::from_fn(security_headers_middleware))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the identity provider does not answer.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.identity().health().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!("Readiness check failed: {e}");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
