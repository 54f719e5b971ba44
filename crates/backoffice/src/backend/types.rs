//! Wire types for the hosted identity, table and realtime services.

use chrono::{DateTime, Duration, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use table1837_core::UserId;

/// PostgREST error code for a single-row read that matched no rows.
pub const NO_ROWS_CODE: &str = "PGRST116";

/// Seconds before expiry at which a token is treated as expired.
const EXPIRY_LEEWAY_SECS: i64 = 30;

// =============================================================================
// Identity
// =============================================================================

/// The authenticated user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

/// An authenticated session with the identity provider.
///
/// Implements `Debug` manually to redact the tokens.
#[derive(Clone)]
pub struct AuthSession {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

impl AuthSession {
    /// Whether the access token has expired (or is about to) at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_LEEWAY_SECS) <= now
    }

    /// Whether both sessions carry the same access token.
    #[must_use]
    pub fn same_tokens(&self, other: &Self) -> bool {
        self.access_token.expose_secret() == other.access_token.expose_secret()
    }

    #[must_use]
    pub fn email(&self) -> &str {
        self.user.email.as_deref().unwrap_or_default()
    }
}

/// Response body of the token endpoint (password and refresh grants).
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl TokenResponse {
    /// Convert into a session, computing the expiry relative to `now` when
    /// the provider does not send an absolute timestamp.
    #[must_use]
    pub fn into_session(self, now: DateTime<Utc>) -> AuthSession {
        let expires_at = self
            .expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(|| now + Duration::seconds(self.expires_in));

        AuthSession {
            access_token: SecretString::from(self.access_token),
            refresh_token: SecretString::from(self.refresh_token),
            expires_at,
            user: self.user,
        }
    }
}

/// Error body shared by the identity and table services.
///
/// The identity service sends `msg`/`error_code` (or the older
/// `error`/`error_description`), the table service sends
/// `code`/`message`/`details`/`hint`.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl ApiErrorBody {
    /// Machine-readable error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<String> {
        if let Some(code) = &self.error_code {
            return Some(code.clone());
        }
        match &self.code {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            _ => self.error.clone(),
        }
    }

    /// Human-readable message, if any.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        self.msg
            .clone()
            .or_else(|| self.error_description.clone())
            .or_else(|| self.message.clone())
            .or_else(|| self.error.clone())
    }
}

// =============================================================================
// Realtime
// =============================================================================

/// Kind of row change carried by a realtime notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Which row changes a subscription receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeFilter {
    #[default]
    All,
    Only(ChangeKind),
}

impl ChangeFilter {
    /// Event name used in the channel join config.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::All => "*",
            Self::Only(ChangeKind::Insert) => "INSERT",
            Self::Only(ChangeKind::Update) => "UPDATE",
            Self::Only(ChangeKind::Delete) => "DELETE",
        }
    }

    #[must_use]
    pub fn matches(&self, kind: ChangeKind) -> bool {
        match self {
            Self::All => true,
            Self::Only(only) => *only == kind,
        }
    }
}

/// A row change on a subscribed table.
///
/// Only the table and the kind of change are kept. Consumers refetch
/// instead of trusting the pushed row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    pub table: String,
    pub kind: ChangeKind,
}

/// A Phoenix channel frame (serializer `vsn=1.0.0`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

/// `payload` of a `postgres_changes` frame.
#[derive(Debug, Deserialize)]
pub struct PostgresChangesPayload {
    pub data: PostgresChange,
}

#[derive(Debug, Deserialize)]
pub struct PostgresChange {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
}
