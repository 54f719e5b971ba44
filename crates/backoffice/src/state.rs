//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::{
    BackendError, ChangeFeed, IdentityClient, IdentityProvider, RealtimeClient, TableClient,
    TableStore,
};
use crate::config::{BackendConfig, BackofficeConfig};
use crate::middleware::session::SESSION_EXPIRY_SECONDS;
use crate::services::{ClientContexts, DashboardService, RetryPolicy};

/// Handles to the three hosted backend services.
#[derive(Clone)]
pub struct Backends {
    pub identity: Arc<dyn IdentityProvider>,
    pub tables: Arc<dyn TableStore>,
    pub changes: Arc<dyn ChangeFeed>,
}

impl Backends {
    /// Clients for the configured hosted backend.
    ///
    /// # Errors
    ///
    /// Returns an error if a client cannot be built from the configuration.
    pub fn hosted(config: &BackendConfig) -> Result<Self, BackendError> {
        Ok(Self {
            identity: Arc::new(IdentityClient::new(config)?),
            tables: Arc::new(TableClient::new(config)?),
            changes: Arc::new(RealtimeClient::new(config)?),
        })
    }
}

/// Tunables that tests shorten.
#[derive(Debug, Clone, Copy)]
pub struct StateOptions {
    /// Retry schedule for dashboard reads.
    pub retry: RetryPolicy,
    /// How long the route guard waits for a client's auth state to load
    /// before serving the loading page.
    pub guard_grace: Duration,
}

impl Default for StateOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            guard_grace: Duration::from_secs(3),
        }
    }
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: BackofficeConfig,
    backends: Backends,
    dashboard: DashboardService,
    clients: ClientContexts,
    guard_grace: Duration,
}

impl AppState {
    /// Create the application state with default options.
    #[must_use]
    pub fn new(config: BackofficeConfig, backends: Backends) -> Self {
        Self::with_options(config, backends, StateOptions::default())
    }

    #[must_use]
    pub fn with_options(
        config: BackofficeConfig,
        backends: Backends,
        options: StateOptions,
    ) -> Self {
        let dashboard = DashboardService::new(Arc::clone(&backends.tables), options.retry);
        let clients = ClientContexts::new(
            Arc::clone(&backends.identity),
            Arc::clone(&backends.tables),
            Duration::from_secs(SESSION_EXPIRY_SECONDS.unsigned_abs()),
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                backends,
                dashboard,
                clients,
                guard_grace: options.guard_grace,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BackofficeConfig {
        &self.inner.config
    }

    /// The hosted identity provider.
    #[must_use]
    pub fn identity(&self) -> &dyn IdentityProvider {
        self.inner.backends.identity.as_ref()
    }

    /// The realtime change feed.
    #[must_use]
    pub fn changes(&self) -> &dyn ChangeFeed {
        self.inner.backends.changes.as_ref()
    }

    #[must_use]
    pub fn dashboard(&self) -> &DashboardService {
        &self.inner.dashboard
    }

    /// Per-browser client contexts.
    #[must_use]
    pub fn clients(&self) -> &ClientContexts {
        &self.inner.clients
    }

    #[must_use]
    pub fn guard_grace(&self) -> Duration {
        self.inner.guard_grace
    }
}
