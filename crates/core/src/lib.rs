//! Table 1837 Core - Shared domain types.
//!
//! This crate provides the types used by the back-office web application:
//! - `backoffice` - Server-rendered back office (login, navigation, dashboard)
//! - `integration-tests` - Router-level tests against in-memory backends
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients. Everything that talks to the hosted backend lives in `backoffice`.
//!
//! # Modules
//!
//! - [`types`] - IDs, emails, roles and the hosted table records
//! - [`nav`] - Navigation tabs and role-based visibility
//! - [`specials`] - Happy hour specials and the per-day fallback table

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod nav;
pub mod specials;
pub mod types;

pub use nav::{TABS, Tab, TabSpec, visible_tabs};
pub use specials::{DisplaySpecial, day_index, default_special, resolve_special};
pub use types::*;
