//! Page chrome: header, signed-in user and the tab bar.

use table1837_core::{Tab, visible_tabs};

use crate::services::CurrentUser;

/// One tab in the navigation bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavLink {
    pub label: &'static str,
    pub href: String,
    pub active: bool,
}

/// Everything the shared layout needs.
#[derive(Debug, Clone)]
pub struct LayoutView {
    pub email: String,
    pub role: String,
    pub tabs: Vec<NavLink>,
}

impl LayoutView {
    /// Layout for `user` on the page at `path`.
    ///
    /// Only tabs the user's role may see are listed, in declared order. The
    /// tab matching the first path segment is marked active.
    #[must_use]
    pub fn new(user: &CurrentUser, path: &str) -> Self {
        let active = Tab::from_path(path);
        let tabs = visible_tabs(user.role)
            .into_iter()
            .map(|spec| NavLink {
                label: spec.label,
                href: spec.tab.href(),
                active: Some(spec.tab) == active,
            })
            .collect();

        Self {
            email: user.email().to_string(),
            role: user.role.to_string(),
            tabs,
        }
    }
}
