//! Core types for Table 1837.
//!
//! This module provides type-safe wrappers for common domain concepts and the
//! row types of the hosted tables.

pub mod email;
pub mod id;
pub mod records;
pub mod role;

pub use email::{Email, EmailError};
pub use id::*;
pub use records::{HappyHourSpecial, Item86, Wine, WineCategory};
pub use role::{Role, RoleParseError};
