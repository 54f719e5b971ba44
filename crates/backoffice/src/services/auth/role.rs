//! Role resolution from the `user_roles` table.

use secrecy::SecretString;
use serde::Deserialize;
use tracing::instrument;

use table1837_core::{Role, UserId};

use crate::backend::{BackendError, TableQuery, TableStore, select_single};

pub const USER_ROLES_TABLE: &str = "user_roles";

#[derive(Debug, Deserialize)]
struct RoleRow {
    role: Role,
}

/// Look up the role assigned to `user_id`.
///
/// Never fails: a missing row, a malformed row or a failed read all fall back
/// to [`Role::LOWEST_PRIVILEGE`].
#[instrument(skip(tables, access_token), fields(user_id = %user_id))]
pub async fn resolve_role(
    tables: &dyn TableStore,
    user_id: UserId,
    access_token: Option<&SecretString>,
) -> Role {
    let query = TableQuery::from(USER_ROLES_TABLE)
        .select("role")
        .eq("user_id", user_id);

    match select_single::<RoleRow>(tables, &query, access_token).await {
        Ok(row) => row.role,
        Err(BackendError::NoRows) => {
            tracing::warn!("No role assigned, using {}", Role::LOWEST_PRIVILEGE);
            Role::LOWEST_PRIVILEGE
        }
        Err(e) => {
            tracing::warn!(
                "Failed to fetch user role, using {}: {e}",
                Role::LOWEST_PRIVILEGE
            );
            Role::LOWEST_PRIVILEGE
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::backend::testing::FakeTables;

    fn user() -> UserId {
        UserId::new(uuid::Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_assigned_role_is_adopted() {
        let tables = FakeTables::new();
        let admin = user();
        tables.insert(
            USER_ROLES_TABLE,
            json!({ "user_id": admin.to_string(), "role": "admin" }),
        );

        assert_eq!(resolve_role(&tables, admin, None).await, Role::Admin);
    }

    #[tokio::test]
    async fn test_missing_row_is_viewer() {
        let tables = FakeTables::new();
        tables.insert(
            USER_ROLES_TABLE,
            json!({ "user_id": user().to_string(), "role": "admin" }),
        );

        assert_eq!(resolve_role(&tables, user(), None).await, Role::Viewer);
    }

    #[tokio::test]
    async fn test_read_failure_is_viewer() {
        let tables = FakeTables::new();
        let staff = user();
        tables.insert(
            USER_ROLES_TABLE,
            json!({ "user_id": staff.to_string(), "role": "staff" }),
        );
        tables.fail(USER_ROLES_TABLE, 500);

        assert_eq!(resolve_role(&tables, staff, None).await, Role::Viewer);
    }

    #[tokio::test]
    async fn test_unknown_role_value_is_viewer() {
        let tables = FakeTables::new();
        let owner = user();
        tables.insert(
            USER_ROLES_TABLE,
            json!({ "user_id": owner.to_string(), "role": "owner" }),
        );

        assert_eq!(resolve_role(&tables, owner, None).await, Role::Viewer);
    }

    #[tokio::test]
    async fn test_duplicate_rows_are_viewer() {
        let tables = FakeTables::new();
        let staff = user();
        for role in ["staff", "admin"] {
            tables.insert(
                USER_ROLES_TABLE,
                json!({ "user_id": staff.to_string(), "role": role }),
            );
        }

        assert_eq!(resolve_role(&tables, staff, None).await, Role::Viewer);
    }
}
