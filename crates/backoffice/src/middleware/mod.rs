//! HTTP middleware stack for the back office.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request span)
//! 3. Request ID
//! 4. Security headers
//! 5. Session layer (tower-sessions, in-memory store)
//! 6. Route guard (`route_layer` on guarded routers only)

pub mod auth;
pub mod client;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use auth::{GuardDecision, LOGIN_PATH, RequireAdmin, RequireSession, require_session};
pub use client::{Client, load_client, sync_persisted};
pub use request_id::{REQUEST_ID_HEADER, request_id_middleware};
pub use security_headers::security_headers_middleware;
pub use session::{SESSION_COOKIE_NAME, create_session_layer};
