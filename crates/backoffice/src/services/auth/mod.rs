//! Authentication for the back office.
//!
//! Sign-in is delegated to the hosted identity provider. Each browser gets a
//! [`ClientContext`] holding a [`SessionStore`] and the [`AuthContext`] that
//! tracks its session and role.
//!
//! # Flow
//!
//! 1. The cookie session carries a client id and the persisted tokens
//! 2. [`ClientContexts`] maps the id to a live context, restoring the tokens
//!    the first time it sees the client
//! 3. The context's writer validates or refreshes the tokens, then resolves
//!    the role from `user_roles`
//! 4. The route guard reads the published [`AuthState`]

mod clients;
mod context;
mod error;
pub mod role;
mod session_store;

pub use clients::{ClientContext, ClientContexts};
pub use context::{AuthContext, AuthState, CurrentUser};
pub use error::AuthError;
pub use role::resolve_role;
pub use session_store::{SessionEvent, SessionStore};
