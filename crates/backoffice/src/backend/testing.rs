//! In-memory backend fakes.
//!
//! Enabled for unit tests and, through the `testing` feature, for the
//! router-level integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;

use table1837_core::UserId;

use super::{
    AuthSession, AuthUser, BackendError, ChangeFeed, ChangeFilter, ChangeKind,
    ChangeNotification, ChangeSubscription, IdentityProvider, TableQuery,
    TableStore,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn api_error(status: u16, message: &str) -> BackendError {
    BackendError::Api {
        status,
        code: None,
        message: message.to_string(),
    }
}

// =============================================================================
// Identity
// =============================================================================

struct Account {
    password: String,
    user: AuthUser,
}

/// Identity provider backed by a map of accounts.
///
/// Issued tokens are unique per call. Revoked access tokens are rejected by
/// `get_user`.
#[derive(Default)]
pub struct FakeIdentity {
    accounts: Mutex<HashMap<String, Account>>,
    live_tokens: Mutex<HashMap<String, AuthUser>>,
    refresh_tokens: Mutex<HashMap<String, AuthUser>>,
    issued: AtomicUsize,
    /// Fail every call as if the provider were down.
    pub unreachable: AtomicBool,
    /// Fail `sign_out` with a server error.
    pub sign_out_fails: AtomicBool,
    /// While set, `get_user` waits for [`release_lookups`](Self::release_lookups).
    pub hold_lookups: AtomicBool,
    lookups_released: Notify,
    pub sign_in_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
}

impl FakeIdentity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account and return its user.
    pub fn add_user(&self, email: &str, password: &str) -> AuthUser {
        let user = AuthUser {
            id: UserId::new(uuid::Uuid::new_v4()),
            email: Some(email.to_string()),
        };
        lock(&self.accounts).insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user: user.clone(),
            },
        );
        user
    }

    /// Issue a session for `user` that expires `expires_in` from now.
    pub fn issue(&self, user: &AuthUser, expires_in: Duration) -> AuthSession {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let access = format!("access-{n}");
        let refresh = format!("refresh-{n}");
        lock(&self.live_tokens).insert(access.clone(), user.clone());
        lock(&self.refresh_tokens).insert(refresh.clone(), user.clone());
        AuthSession {
            access_token: SecretString::from(access),
            refresh_token: SecretString::from(refresh),
            expires_at: Utc::now() + expires_in,
            user: user.clone(),
        }
    }

    /// Invalidate an access token as if it had been revoked server-side.
    pub fn revoke(&self, access_token: &SecretString) {
        lock(&self.live_tokens).remove(access_token.expose_secret());
    }

    /// Let held `get_user` calls continue.
    pub fn release_lookups(&self) {
        self.hold_lookups.store(false, Ordering::SeqCst);
        self.lookups_released.notify_waiters();
    }

    fn check_reachable(&self) -> Result<(), BackendError> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(api_error(503, "identity provider unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<AuthSession, BackendError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        let user = lock(&self.accounts)
            .get(email)
            .filter(|a| a.password == password.expose_secret())
            .map(|a| a.user.clone());
        match user {
            Some(user) => Ok(self.issue(&user, Duration::hours(1))),
            None => Err(BackendError::Api {
                status: 400,
                code: Some("invalid_credentials".to_string()),
                message: "Invalid login credentials".to_string(),
            }),
        }
    }

    async fn get_user(&self, access_token: &SecretString) -> Result<AuthUser, BackendError> {
        loop {
            let released = self.lookups_released.notified();
            if !self.hold_lookups.load(Ordering::SeqCst) {
                break;
            }
            released.await;
        }
        self.check_reachable()?;
        lock(&self.live_tokens)
            .get(access_token.expose_secret())
            .cloned()
            .ok_or_else(|| api_error(401, "invalid JWT"))
    }

    async fn refresh_session(
        &self,
        refresh_token: &SecretString,
    ) -> Result<AuthSession, BackendError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        let user = lock(&self.refresh_tokens)
            .remove(refresh_token.expose_secret())
            .ok_or_else(|| api_error(400, "Invalid Refresh Token"))?;
        Ok(self.issue(&user, Duration::hours(1)))
    }

    async fn sign_out(&self, access_token: &SecretString) -> Result<(), BackendError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        if self.sign_out_fails.load(Ordering::SeqCst) {
            return Err(api_error(500, "logout failed"));
        }
        self.revoke(access_token);
        Ok(())
    }

    async fn health(&self) -> Result<(), BackendError> {
        self.check_reachable()
    }
}

// =============================================================================
// Tables
// =============================================================================

/// Table store holding rows as JSON.
///
/// Supports equality filters, a descending or ascending sort on one column,
/// row limits and single-row reads.
#[derive(Default)]
pub struct FakeTables {
    rows: Mutex<HashMap<String, Vec<Value>>>,
    failing: Mutex<HashMap<String, u16>>,
    calls: Mutex<HashMap<String, usize>>,
    tokens: Mutex<HashMap<String, Option<String>>>,
}

impl FakeTables {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, table: &str, row: Value) {
        lock(&self.rows).entry(table.to_string()).or_default().push(row);
    }

    pub fn clear(&self, table: &str) {
        lock(&self.rows).remove(table);
    }

    /// Make every read of `table` fail with `status`.
    pub fn fail(&self, table: &str, status: u16) {
        lock(&self.failing).insert(table.to_string(), status);
    }

    pub fn recover(&self, table: &str) {
        lock(&self.failing).remove(table);
    }

    /// Number of reads issued against `table`.
    #[must_use]
    pub fn calls(&self, table: &str) -> usize {
        lock(&self.calls).get(table).copied().unwrap_or_default()
    }

    /// Access token sent with the latest read of `table`.
    #[must_use]
    pub fn last_token(&self, table: &str) -> Option<String> {
        lock(&self.tokens).get(table).cloned().flatten()
    }

    fn matching(&self, query: &TableQuery) -> Vec<Value> {
        let rows = lock(&self.rows);
        let mut matched: Vec<Value> = rows
            .get(query.table())
            .map(|rows| {
                rows.iter()
                    .filter(|row| row_matches(row, query))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(rows);

        if let Some((column, order)) = query.ordering() {
            matched.sort_by_key(|row| cell_text(row.get(column)));
            if order == super::Order::Desc {
                matched.reverse();
            }
        }
        if let Some(limit) = query.row_limit() {
            matched.truncate(limit);
        }
        matched
    }
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn row_matches(row: &Value, query: &TableQuery) -> bool {
    query
        .query_pairs()
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "select" | "order" | "limit"))
        .all(|(column, filter)| {
            filter
                .strip_prefix("eq.")
                .is_some_and(|want| cell_text(row.get(column)) == want)
        })
}

#[async_trait]
impl TableStore for FakeTables {
    async fn fetch(
        &self,
        query: &TableQuery,
        access_token: Option<&SecretString>,
    ) -> Result<Value, BackendError> {
        *lock(&self.calls).entry(query.table().to_string()).or_default() += 1;
        lock(&self.tokens).insert(
            query.table().to_string(),
            access_token.map(|token| token.expose_secret().to_string()),
        );

        if let Some(status) = lock(&self.failing).get(query.table()).copied() {
            return Err(api_error(status, "table read failed"));
        }

        let mut rows = self.matching(query);
        if !query.is_single() {
            return Ok(Value::Array(rows));
        }
        // PostgREST reports zero and multiple rows alike for object reads.
        match (rows.pop(), rows.is_empty()) {
            (Some(row), true) => Ok(row),
            _ => Err(BackendError::NoRows),
        }
    }
}

// =============================================================================
// Change feed
// =============================================================================

struct FeedSubscriber {
    table: String,
    filter: ChangeFilter,
    sender: mpsc::Sender<ChangeNotification>,
    cancel: CancellationToken,
}

/// Change feed driven by [`FakeFeed::notify`].
#[derive(Default)]
pub struct FakeFeed {
    subscribers: Mutex<Vec<FeedSubscriber>>,
    /// Fail every `subscribe` call.
    pub unavailable: AtomicBool,
}

impl FakeFeed {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a change on `table` to every open subscription that wants it.
    /// Returns the number of subscriptions notified.
    pub async fn notify(&self, table: &str, kind: ChangeKind) -> usize {
        let senders: Vec<_> = lock(&self.subscribers)
            .iter()
            .filter(|s| s.table == table && s.filter.matches(kind) && !s.cancel.is_cancelled())
            .map(|s| s.sender.clone())
            .collect();

        let mut delivered = 0;
        for sender in senders {
            let notification = ChangeNotification {
                table: table.to_string(),
                kind,
            };
            if sender.send(notification).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Subscriptions on `table` that have not been dropped.
    #[must_use]
    pub fn open_subscriptions(&self, table: &str) -> usize {
        lock(&self.subscribers)
            .iter()
            .filter(|s| s.table == table && !s.cancel.is_cancelled())
            .count()
    }
}

#[async_trait]
impl ChangeFeed for FakeFeed {
    async fn subscribe(
        &self,
        table: &str,
        filter: ChangeFilter,
        _access_token: Option<&SecretString>,
    ) -> Result<ChangeSubscription, BackendError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BackendError::Realtime("socket unavailable".to_string()));
        }
        let (sender, receiver) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        lock(&self.subscribers).push(FeedSubscriber {
            table: table.to_string(),
            filter,
            sender,
            cancel: cancel.clone(),
        });
        Ok(ChangeSubscription::new(receiver, cancel))
    }
}
