//! Business logic services for the back office.
//!
//! # Services
//!
//! - `auth` - Sessions, role resolution and per-client auth state
//! - `dashboard` - Featured wines, 86'd items and today's special
//! - `live` - Realtime refresh of the 86'd list

pub mod auth;
pub mod dashboard;
pub mod live;

pub use auth::{AuthContext, AuthError, AuthState, ClientContext, ClientContexts, CurrentUser};
pub use dashboard::{DashboardData, DashboardQuery, DashboardService, QueryCache, RetryPolicy};
pub use live::LiveItems86;
