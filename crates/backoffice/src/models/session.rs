//! Types stored in the cookie session.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::backend::{AuthSession, AuthUser};

/// Session keys.
pub mod keys {
    /// Key for the per-browser client id.
    pub const CLIENT_ID: &str = "client_id";

    /// Key for the persisted identity-provider session.
    pub const AUTH_SESSION: &str = "auth_session";
}

/// Identity-provider tokens persisted between server restarts.
#[derive(Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
    user: AuthUser,
}

impl std::fmt::Debug for PersistedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedSession")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl PersistedSession {
    /// Whether this is the persisted form of `session`.
    #[must_use]
    pub fn matches(&self, session: &AuthSession) -> bool {
        self.access_token == session.access_token.expose_secret()
    }
}

impl From<&AuthSession> for PersistedSession {
    fn from(session: &AuthSession) -> Self {
        Self {
            access_token: session.access_token.expose_secret().to_string(),
            refresh_token: session.refresh_token.expose_secret().to_string(),
            expires_at: session.expires_at,
            user: session.user.clone(),
        }
    }
}

impl From<PersistedSession> for AuthSession {
    fn from(persisted: PersistedSession) -> Self {
        Self {
            access_token: SecretString::from(persisted.access_token),
            refresh_token: SecretString::from(persisted.refresh_token),
            expires_at: persisted.expires_at,
            user: persisted.user,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use table1837_core::UserId;

    fn session() -> AuthSession {
        AuthSession {
            access_token: SecretString::from("access-1".to_string()),
            refresh_token: SecretString::from("refresh-1".to_string()),
            expires_at: Utc::now(),
            user: AuthUser {
                id: UserId::new(uuid::Uuid::new_v4()),
                email: Some("bar@table1837.test".to_string()),
            },
        }
    }

    #[test]
    fn test_restores_tokens() {
        let original = session();
        let json = serde_json::to_string(&PersistedSession::from(&original)).unwrap();
        let restored: AuthSession = serde_json::from_str::<PersistedSession>(&json)
            .unwrap()
            .into();

        assert!(restored.same_tokens(&original));
        assert_eq!(restored.refresh_token.expose_secret(), "refresh-1");
        assert_eq!(restored.user, original.user);
    }

    #[test]
    fn test_debug_hides_tokens() {
        let debug = format!("{:?}", PersistedSession::from(&session()));
        assert!(!debug.contains("access-1"));
        assert!(!debug.contains("refresh-1"));
    }
}
