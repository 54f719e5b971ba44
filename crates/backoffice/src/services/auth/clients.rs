//! Registry of per-browser client contexts.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use uuid::Uuid;

use super::context::AuthContext;
use super::session_store::SessionStore;
use crate::backend::{AuthSession, IdentityProvider, TableStore};
use crate::services::dashboard::QueryCache;

/// Everything the server keeps for one browser.
#[derive(Clone)]
pub struct ClientContext {
    pub id: Uuid,
    pub auth: AuthContext,
    pub queries: QueryCache,
}

/// Client contexts keyed by the id stored in the cookie session.
///
/// Entries idle out with the cookie session; eviction shuts the auth context
/// down.
#[derive(Clone)]
pub struct ClientContexts {
    contexts: Cache<Uuid, ClientContext>,
    identity: Arc<dyn IdentityProvider>,
    tables: Arc<dyn TableStore>,
}

impl ClientContexts {
    #[must_use]
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        tables: Arc<dyn TableStore>,
        idle_timeout: Duration,
    ) -> Self {
        let contexts = Cache::builder()
            .max_capacity(10_000)
            .time_to_idle(idle_timeout)
            .eviction_listener(|id, context: ClientContext, cause| {
                tracing::debug!(client_id = %id, ?cause, "Client context evicted");
                context.auth.shutdown();
            })
            .build();

        Self {
            contexts,
            identity,
            tables,
        }
    }

    /// The context for `id`, creating it from `restored` if this server has
    /// not seen the client yet.
    pub async fn get_or_create(&self, id: Uuid, restored: Option<AuthSession>) -> ClientContext {
        self.contexts
            .get_with(id, async {
                tracing::debug!(client_id = %id, restored = restored.is_some(), "New client context");
                let store = Arc::new(SessionStore::new(Arc::clone(&self.identity), restored));
                ClientContext {
                    id,
                    auth: AuthContext::spawn(store, Arc::clone(&self.tables)),
                    queries: QueryCache::new(),
                }
            })
            .await
    }

    pub async fn get(&self, id: Uuid) -> Option<ClientContext> {
        self.contexts.get(&id).await
    }

    /// Forget a client and shut its context down.
    pub async fn remove(&self, id: Uuid) {
        if let Some(context) = self.contexts.remove(&id).await {
            context.auth.shutdown();
        }
        self.contexts.run_pending_tasks().await;
    }

    /// Shut every context down.
    pub async fn clear(&self) {
        for (_, context) in self.contexts.iter() {
            context.auth.shutdown();
        }
        self.contexts.invalidate_all();
        self.contexts.run_pending_tasks().await;
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.contexts.entry_count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
