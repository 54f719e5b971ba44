//! Navigation tabs shown in the back-office header.

use crate::types::Role;

/// A top-level section of the back office.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tab {
    Dashboard,
    Cocktails,
    Staff,
    Admin,
    Wine,
    Inventory,
}

impl Tab {
    /// URL path segment, also used as the tab key.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::Cocktails => "cocktails",
            Self::Staff => "staff",
            Self::Admin => "admin",
            Self::Wine => "wine",
            Self::Inventory => "inventory",
        }
    }

    /// Route for this tab.
    #[must_use]
    pub fn href(&self) -> String {
        format!("/{}", self.key())
    }

    /// Header label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Dashboard => "Dashboard",
            Self::Cocktails => "Cocktails",
            Self::Staff => "Staff",
            Self::Admin => "Admin",
            Self::Wine => "Wine",
            Self::Inventory => "Inventory",
        }
    }

    /// Static description of this tab.
    #[must_use]
    pub const fn spec(self) -> TabSpec {
        TabSpec {
            tab: self,
            label: self.label(),
            admin_only: matches!(self, Self::Admin),
        }
    }

    /// Which tab a request path belongs to, by its first segment.
    ///
    /// `/dashboard/items-86/stream` belongs to [`Tab::Dashboard`].
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let first = path.trim_start_matches('/').split('/').next()?;
        TABS.iter().find(|t| t.tab.key() == first).map(|t| t.tab)
    }
}

impl std::fmt::Display for Tab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Label and visibility for a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabSpec {
    pub tab: Tab,
    pub label: &'static str,
    pub admin_only: bool,
}

/// All tabs in display order.
pub static TABS: [TabSpec; 6] = [
    Tab::Dashboard.spec(),
    Tab::Cocktails.spec(),
    Tab::Staff.spec(),
    Tab::Admin.spec(),
    Tab::Wine.spec(),
    Tab::Inventory.spec(),
];

impl TabSpec {
    /// Whether a user with `role` may see this tab.
    #[must_use]
    pub const fn visible_to(&self, role: Role) -> bool {
        !self.admin_only || role.is_admin()
    }
}

/// Tabs a role may see, in display order.
#[must_use]
pub fn visible_tabs(role: Role) -> Vec<&'static TabSpec> {
    TABS.iter().filter(|t| t.visible_to(role)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(role: Role) -> Vec<&'static str> {
        visible_tabs(role).iter().map(|t| t.label).collect()
    }

    #[test]
    fn test_admin_sees_every_tab_in_order() {
        assert_eq!(
            labels(Role::Admin),
            ["Dashboard", "Cocktails", "Staff", "Admin", "Wine", "Inventory"]
        );
    }

    #[test]
    fn test_non_admins_lose_only_admin_tab() {
        for role in [Role::Staff, Role::Viewer] {
            assert_eq!(
                labels(role),
                ["Dashboard", "Cocktails", "Staff", "Wine", "Inventory"]
            );
        }
    }

    #[test]
    fn test_href_is_key() {
        assert_eq!(Tab::Dashboard.href(), "/dashboard");
        assert_eq!(Tab::Inventory.href(), "/inventory");
        assert_eq!(Tab::Admin.spec().label, "Admin");
    }

    #[test]
    fn test_from_path() {
        assert_eq!(Tab::from_path("/dashboard"), Some(Tab::Dashboard));
        assert_eq!(
            Tab::from_path("/dashboard/items-86/stream"),
            Some(Tab::Dashboard)
        );
        assert_eq!(Tab::from_path("/wine"), Some(Tab::Wine));
        assert_eq!(Tab::from_path("/"), None);
        assert_eq!(Tab::from_path("/logout"), None);
    }
}
