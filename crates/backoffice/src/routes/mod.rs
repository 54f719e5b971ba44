//! HTTP route handlers for the back office.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                      - Liveness
//! GET  /health/ready                - Readiness (identity provider answers)
//! GET  /static/*                    - Stylesheet and scripts
//!
//! # Auth
//! GET  /                            - Login page (signed in: redirect to /dashboard)
//! POST /                            - Sign in with email and password
//! POST /logout                      - Sign out
//!
//! # Guarded
//! GET  /dashboard                   - Wines, 86'd items, specials
//! GET  /dashboard/items-86/stream   - Live 86'd panel (SSE)
//! GET  /cocktails
//! GET  /staff
//! GET  /admin                       - Admin role only
//! GET  /wine
//! GET  /inventory
//! ```

use axum::{Router, middleware::from_fn_with_state};

use crate::middleware::require_session;
use crate::state::AppState;

pub mod auth;
pub mod dashboard;
pub mod pages;

/// Build the application router.
///
/// Everything except the auth routes sits behind the route guard.
pub fn routes(state: &AppState) -> Router<AppState> {
    let guarded = Router::new()
        .merge(dashboard::router())
        .merge(pages::router())
        .route_layer(from_fn_with_state(state.clone(), require_session));

    Router::new().merge(auth::router()).merge(guarded)
}
