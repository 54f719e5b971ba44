//! Clients for the hosted backend.
//!
//! # Architecture
//!
//! - Identity (GoTrue-style REST) for password sign-in, token refresh and
//!   sign-out
//! - Tables (PostgREST-style REST) for row reads
//! - Realtime (Phoenix channels over WebSocket) for row-change notifications
//!
//! Each service sits behind a trait so handlers and the auth layer can be
//! driven by in-memory fakes in tests.
//!
//! # Example
//!
//! ```rust,ignore
//! let tables = TableClient::new(&config.backend)?;
//! let wines: Vec<Wine> = select(
//!     &tables,
//!     &TableQuery::from("wines").order_desc("created_at").limit(2),
//!     Some(&session.access_token),
//! )
//! .await?;
//! ```

pub mod identity;
pub mod realtime;
pub mod rest;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use identity::IdentityClient;
pub use realtime::RealtimeClient;
pub use rest::{Order, TableClient, TableQuery};
pub use types::*;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Errors that can occur when talking to the hosted backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The service answered with an error status.
    #[error("API error: {status} {}- {message}", .code.as_deref().map(|c| format!("({c}) ")).unwrap_or_default())]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// A single-row read matched no rows.
    #[error("No rows returned")]
    NoRows,

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Realtime socket failure.
    #[error("Realtime error: {0}")]
    Realtime(String),

    /// Invalid endpoint URL.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl BackendError {
    /// Whether repeating the request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited(_) | Self::Realtime(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Parse(_) | Self::NoRows | Self::Url(_) => false,
        }
    }

    /// Whether the backend rejected the caller's credentials or token.
    #[must_use]
    pub const fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status == 400 || *status == 401 || *status == 403)
    }
}

// =============================================================================
// Service traits
// =============================================================================

/// Hosted identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange email and password for a session.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<AuthSession, BackendError>;

    /// Fetch the user an access token belongs to. Fails if the token is no
    /// longer valid.
    async fn get_user(&self, access_token: &SecretString) -> Result<AuthUser, BackendError>;

    /// Exchange a refresh token for a new session.
    async fn refresh_session(&self, refresh_token: &SecretString)
    -> Result<AuthSession, BackendError>;

    /// Revoke the session an access token belongs to.
    async fn sign_out(&self, access_token: &SecretString) -> Result<(), BackendError>;

    /// Check that the provider is reachable.
    async fn health(&self) -> Result<(), BackendError>;
}

/// Hosted table store.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Run a read query.
    ///
    /// Returns a JSON array of rows, or a single JSON object when the query
    /// asks for exactly one row. A single-row read matching nothing fails with
    /// [`BackendError::NoRows`].
    async fn fetch(
        &self,
        query: &TableQuery,
        access_token: Option<&SecretString>,
    ) -> Result<serde_json::Value, BackendError>;
}

/// Push feed of row changes.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a subscription to changes on `table` in the public schema.
    async fn subscribe(
        &self,
        table: &str,
        filter: ChangeFilter,
        access_token: Option<&SecretString>,
    ) -> Result<ChangeSubscription, BackendError>;
}

/// A live change subscription.
///
/// Dropping it cancels the feed task, which leaves the channel.
#[derive(Debug)]
pub struct ChangeSubscription {
    notifications: mpsc::Receiver<ChangeNotification>,
    _guard: DropGuard,
}

impl ChangeSubscription {
    /// Wrap a notification receiver. `cancel` is cancelled when the
    /// subscription is dropped.
    #[must_use]
    pub fn new(notifications: mpsc::Receiver<ChangeNotification>, cancel: CancellationToken) -> Self {
        Self {
            notifications,
            _guard: cancel.drop_guard(),
        }
    }

    /// Wait for the next notification. `None` once the feed has closed.
    pub async fn next(&mut self) -> Option<ChangeNotification> {
        self.notifications.recv().await
    }
}

// =============================================================================
// Typed reads
// =============================================================================

/// Read rows and deserialize them.
///
/// # Errors
///
/// Returns an error if the read fails or a row does not match `T`.
pub async fn select<T: DeserializeOwned>(
    store: &dyn TableStore,
    query: &TableQuery,
    access_token: Option<&SecretString>,
) -> Result<Vec<T>, BackendError> {
    let value = store.fetch(query, access_token).await?;
    decode(query, value)
}

/// Read exactly one row.
///
/// # Errors
///
/// Returns [`BackendError::NoRows`] if nothing matched, or any other read
/// failure.
pub async fn select_single<T: DeserializeOwned>(
    store: &dyn TableStore,
    query: &TableQuery,
    access_token: Option<&SecretString>,
) -> Result<T, BackendError> {
    let query = query.clone().single();
    let value = store.fetch(&query, access_token).await?;
    decode(&query, value)
}

fn decode<T: DeserializeOwned>(query: &TableQuery, value: serde_json::Value) -> Result<T, BackendError> {
    serde_json::from_value(value).map_err(|e| {
        tracing::error!(
            error = %e,
            table = %query.table(),
            "Failed to decode table rows"
        );
        BackendError::Parse(e)
    })
}

// =============================================================================
// Shared HTTP handling
// =============================================================================

/// Send a request and return the body of a successful response.
///
/// Non-success statuses are turned into [`BackendError::Api`] (or
/// [`BackendError::NoRows`] / [`BackendError::RateLimited`]).
pub(crate) async fn send(
    request: reqwest::RequestBuilder,
    service: &'static str,
) -> Result<String, BackendError> {
    let response = request.send().await?;
    let status = response.status();

    // Check for rate limiting
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1);
        return Err(BackendError::RateLimited(retry_after));
    }

    // Get response body as text first for better error diagnostics
    let body = response.text().await?;

    if status.is_success() {
        return Ok(body);
    }

    let error: ApiErrorBody = serde_json::from_str(&body).unwrap_or_default();
    let code = error.code();

    if code.as_deref() == Some(NO_ROWS_CODE) {
        return Err(BackendError::NoRows);
    }

    if status.is_server_error() {
        tracing::error!(
            service,
            status = %status,
            body = %body.chars().take(500).collect::<String>(),
            "Backend returned server error"
        );
    } else {
        tracing::debug!(service, status = %status, code = ?code, "Backend rejected request");
    }

    Err(BackendError::Api {
        status: status.as_u16(),
        code,
        message: error
            .message()
            .unwrap_or_else(|| body.chars().take(200).collect()),
    })
}

/// Parse a response body, logging the body on failure.
pub(crate) fn parse_json<T: DeserializeOwned>(
    body: &str,
    service: &'static str,
) -> Result<T, BackendError> {
    serde_json::from_str(body).map_err(|e| {
        tracing::error!(
            service,
            error = %e,
            body = %body.chars().take(500).collect::<String>(),
            "Failed to parse backend response"
        );
        BackendError::Parse(e)
    })
}

/// Ensure a base URL ends in `/` so relative joins append rather than
/// replace the last path segment.
pub(crate) fn directory_url(base: &url::Url, path: &str) -> Result<url::Url, BackendError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base.join(path)?)
}
