//! Shared view models for templates.

pub mod navigation;

pub use navigation::{LayoutView, NavLink};
