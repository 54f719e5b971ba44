//! Types persisted outside the process.

pub mod session;

pub use session::{PersistedSession, keys as session_keys};
