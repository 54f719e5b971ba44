//! Live 86'd list.
//!
//! Subscribes to row changes on `items_86` and refetches the list after every
//! change. The pushed row itself is never trusted.

use std::sync::Arc;

use secrecy::SecretString;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::{CancellationToken, DropGuard};

use table1837_core::Item86;

use super::auth::AuthState;
use super::dashboard::{DashboardService, ITEMS_86_TABLE, QueryCache};
use crate::backend::{BackendError, ChangeFeed, ChangeFilter};

pub type Items86Update = Result<Arc<Vec<Item86>>, BackendError>;

/// Access token of the client's session as it stands now.
fn current_token(auth: &watch::Receiver<AuthState>) -> Option<SecretString> {
    auth.borrow()
        .session
        .as_ref()
        .map(|session| session.access_token.clone())
}

/// A running 86'd subscription.
///
/// Dropping it stops the refresh task, which leaves the realtime channel.
/// A refetch still in flight at that point is discarded.
pub struct LiveItems86 {
    updates: mpsc::Receiver<Items86Update>,
    _guard: DropGuard,
}

impl LiveItems86 {
    /// Open the subscription and start the refresh task.
    ///
    /// The first update is a read made right after joining, so a change
    /// between rendering the page and subscribing is not lost. Every read
    /// uses the access token `auth` holds at that moment.
    ///
    /// # Errors
    ///
    /// Returns an error if the change feed cannot be joined.
    pub async fn start(
        feed: &dyn ChangeFeed,
        service: DashboardService,
        cache: QueryCache,
        auth: watch::Receiver<AuthState>,
    ) -> Result<Self, BackendError> {
        let mut subscription = feed
            .subscribe(ITEMS_86_TABLE, ChangeFilter::All, current_token(&auth).as_ref())
            .await?;

        let (tx, updates) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            loop {
                let token = current_token(&auth);
                let result = tokio::select! {
                    biased;
                    () = task_cancel.cancelled() => break,
                    result = service.refresh_items_86(&cache, token.as_ref()) => result,
                };
                if let Err(e) = &result {
                    tracing::error!("Failed to refetch 86'd items: {e}");
                }
                if tx.send(result).await.is_err() {
                    break;
                }

                let notification = tokio::select! {
                    biased;
                    () = task_cancel.cancelled() => break,
                    notification = subscription.next() => notification,
                };
                let Some(notification) = notification else {
                    tracing::debug!("86'd change feed closed");
                    break;
                };
                tracing::debug!(kind = ?notification.kind, "86'd list changed, refetching");
            }
            drop(subscription);
            tracing::debug!("Left 86'd change feed");
        });

        Ok(Self {
            updates,
            _guard: cancel.drop_guard(),
        })
    }

    /// Wait for the next refetched list. `None` once the feed has closed.
    pub async fn next(&mut self) -> Option<Items86Update> {
        self.updates.recv().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::json;

    use table1837_core::{Role, UserId};

    use super::*;
    use crate::backend::testing::{FakeFeed, FakeTables};
    use crate::backend::{AuthSession, AuthUser, ChangeKind};
    use crate::services::dashboard::RetryPolicy;

    fn item(name: &str, created_at: &str) -> serde_json::Value {
        json!({ "id": uuid::Uuid::new_v4(), "name": name, "created_at": created_at })
    }

    fn auth_state(access_token: Option<&str>) -> AuthState {
        AuthState {
            session: access_token.map(|token| AuthSession {
                access_token: SecretString::from(token.to_string()),
                refresh_token: SecretString::from("refresh".to_string()),
                expires_at: Utc::now(),
                user: AuthUser {
                    id: UserId::new(uuid::Uuid::new_v4()),
                    email: Some("bar@table1837.test".to_string()),
                },
            }),
            role: access_token.map(|_| Role::Staff),
            loading: false,
        }
    }

    fn signed_out() -> watch::Receiver<AuthState> {
        watch::channel(auth_state(None)).1
    }

    async fn start(feed: &FakeFeed, tables: &Arc<FakeTables>, cache: QueryCache) -> LiveItems86 {
        let service = DashboardService::new(tables.clone(), RetryPolicy::none());
        LiveItems86::start(feed, service, cache, signed_out())
            .await
            .unwrap()
    }

    fn names(items: &[Item86]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_start_pushes_current_list() {
        let feed = FakeFeed::new();
        let tables = Arc::new(FakeTables::new());
        tables.insert(ITEMS_86_TABLE, item("Lime", "2024-01-01T00:00:00Z"));
        let cache = QueryCache::new();
        // A stale cached list is not what the stream opens with
        DashboardService::new(Arc::new(FakeTables::new()), RetryPolicy::none())
            .items_86(&cache, None)
            .await
            .unwrap();

        let mut live = start(&feed, &tables, cache).await;

        let items = live.next().await.unwrap().unwrap();
        assert_eq!(names(&items), ["Lime"]);
        assert_eq!(tables.calls(ITEMS_86_TABLE), 1);
    }

    #[tokio::test]
    async fn test_insert_triggers_exactly_one_refetch() {
        let feed = FakeFeed::new();
        let tables = Arc::new(FakeTables::new());
        tables.insert(ITEMS_86_TABLE, item("Lime", "2024-01-01T00:00:00Z"));
        let mut live = start(&feed, &tables, QueryCache::new()).await;
        live.next().await.unwrap().unwrap();

        tables.insert(ITEMS_86_TABLE, item("Mint", "2024-01-02T00:00:00Z"));
        assert_eq!(feed.notify(ITEMS_86_TABLE, ChangeKind::Insert).await, 1);

        let items = live.next().await.unwrap().unwrap();
        assert_eq!(names(&items), ["Mint", "Lime"]);
        assert_eq!(tables.calls(ITEMS_86_TABLE), 2);
    }

    #[tokio::test]
    async fn test_every_change_kind_refetches() {
        let feed = FakeFeed::new();
        let tables = Arc::new(FakeTables::new());
        let mut live = start(&feed, &tables, QueryCache::new()).await;
        live.next().await.unwrap().unwrap();

        for kind in [ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete] {
            feed.notify(ITEMS_86_TABLE, kind).await;
            live.next().await.unwrap().unwrap();
        }

        assert_eq!(tables.calls(ITEMS_86_TABLE), 4);
    }

    #[tokio::test]
    async fn test_refetch_failure_is_reported() {
        let feed = FakeFeed::new();
        let tables = Arc::new(FakeTables::new());
        tables.fail(ITEMS_86_TABLE, 500);
        let mut live = start(&feed, &tables, QueryCache::new()).await;
        assert!(live.next().await.unwrap().is_err());

        feed.notify(ITEMS_86_TABLE, ChangeKind::Delete).await;

        assert!(live.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_refetch_uses_latest_access_token() {
        let feed = FakeFeed::new();
        let tables = Arc::new(FakeTables::new());
        let (auth_tx, auth_rx) = watch::channel(auth_state(Some("access-1")));
        let service = DashboardService::new(tables.clone(), RetryPolicy::none());
        let mut live = LiveItems86::start(&feed, service, QueryCache::new(), auth_rx)
            .await
            .unwrap();

        live.next().await.unwrap().unwrap();
        assert_eq!(tables.last_token(ITEMS_86_TABLE).as_deref(), Some("access-1"));

        // The session was refreshed while the stream stayed open
        auth_tx.send_replace(auth_state(Some("access-2")));
        feed.notify(ITEMS_86_TABLE, ChangeKind::Update).await;

        live.next().await.unwrap().unwrap();
        assert_eq!(tables.last_token(ITEMS_86_TABLE).as_deref(), Some("access-2"));
    }

    #[tokio::test]
    async fn test_drop_leaves_the_feed() {
        let feed = FakeFeed::new();
        let tables = Arc::new(FakeTables::new());
        let live = start(&feed, &tables, QueryCache::new()).await;
        assert_eq!(feed.open_subscriptions(ITEMS_86_TABLE), 1);

        drop(live);

        tokio::time::timeout(Duration::from_secs(2), async {
            while feed.open_subscriptions(ITEMS_86_TABLE) > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_unavailable_feed_fails_to_start() {
        let feed = FakeFeed::new();
        feed.unavailable.store(true, Ordering::SeqCst);
        let service = DashboardService::new(Arc::new(FakeTables::new()), RetryPolicy::none());

        let result = LiveItems86::start(&feed, service, QueryCache::new(), signed_out()).await;

        assert!(result.is_err());
    }
}
