//! Per-client auth context.
//!
//! One spawned writer task owns the client's [`AuthState`]. It starts with
//! the restored session, then follows the [`SessionStore`] change feed and
//! resolves the role for every session it sees. Handlers only read.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use table1837_core::{Role, UserId};

use super::error::AuthError;
use super::role::resolve_role;
use super::session_store::{SessionEvent, SessionStore};
use crate::backend::{AuthSession, TableStore};

/// Upper bound on how long a sign-in or sign-out waits for the writer to
/// publish the resulting state.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(15);

/// Auth state of one client.
#[derive(Debug, Clone)]
pub struct AuthState {
    pub session: Option<AuthSession>,
    pub role: Option<Role>,
    /// True until the first session resolution completes.
    pub loading: bool,
}

impl AuthState {
    const fn loading() -> Self {
        Self {
            session: None,
            role: None,
            loading: true,
        }
    }

    /// The signed-in user, once both session and role are known.
    #[must_use]
    pub fn current_user(&self) -> Option<CurrentUser> {
        match (&self.session, self.role) {
            (Some(session), Some(role)) => Some(CurrentUser {
                session: session.clone(),
                role,
            }),
            _ => None,
        }
    }
}

/// A signed-in user and their effective role.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub session: AuthSession,
    pub role: Role,
}

impl CurrentUser {
    #[must_use]
    pub fn email(&self) -> &str {
        self.session.email()
    }

    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.session.user.id
    }

    #[must_use]
    pub const fn access_token(&self) -> &SecretString {
        &self.session.access_token
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Handle to a client's auth state.
///
/// Cheap to clone. The writer task stops on [`shutdown`](Self::shutdown) or
/// when the last handle is dropped.
#[derive(Clone)]
pub struct AuthContext {
    inner: Arc<AuthContextInner>,
}

struct AuthContextInner {
    store: Arc<SessionStore>,
    state: watch::Receiver<AuthState>,
    cancel: CancellationToken,
}

impl Drop for AuthContextInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl AuthContext {
    /// Start the writer task for `store`.
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn spawn(store: Arc<SessionStore>, tables: Arc<dyn TableStore>) -> Self {
        let (tx, rx) = watch::channel(AuthState::loading());
        let cancel = CancellationToken::new();
        // Subscribe before the initial fetch starts so no change is missed.
        let events = store.subscribe();

        let writer = Writer {
            store: Arc::clone(&store),
            tables,
            tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(writer.run(events));

        Self {
            inner: Arc::new(AuthContextInner {
                store,
                state: rx,
                cancel,
            }),
        }
    }

    /// Current state without waiting.
    #[must_use]
    pub fn snapshot(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every published state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.clone()
    }

    /// Wait up to `timeout` for loading to finish, then return the state as
    /// it stands.
    pub async fn wait_ready(&self, timeout: Duration) -> AuthState {
        let mut rx = self.inner.state.clone();
        let ready = tokio::time::timeout(timeout, async move {
            rx.wait_for(|state| !state.loading)
                .await
                .map(|state| state.clone())
        })
        .await;

        match ready {
            Ok(Ok(state)) => state,
            _ => self.snapshot(),
        }
    }

    /// Sign in and wait until the new session and its role are published.
    ///
    /// # Errors
    ///
    /// Returns the sign-in failure, or `AuthError::ContextClosed` if the
    /// context shut down before publishing.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<CurrentUser, AuthError> {
        let session = self.inner.store.sign_in(email, password).await?;
        self.settled_user(&session).await
    }

    /// Exchange the refresh token and wait until the new session is
    /// published.
    ///
    /// # Errors
    ///
    /// Returns the refresh failure, or `AuthError::ContextClosed`.
    pub async fn refresh(&self) -> Result<CurrentUser, AuthError> {
        let session = self.inner.store.refresh().await?;
        self.settled_user(&session).await
    }

    /// Sign out and wait until the empty session is published.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::ContextClosed` if the context shut down first.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.inner.store.sign_out().await;
        self.settled(|state| !state.loading && state.session.is_none())
            .await
            .map(|_| ())
    }

    /// Stop the writer task. Nothing is published afterwards.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    async fn settled_user(&self, session: &AuthSession) -> Result<CurrentUser, AuthError> {
        let state = self
            .settled(|state| {
                state.role.is_some()
                    && state
                        .session
                        .as_ref()
                        .is_some_and(|current| current.same_tokens(session))
            })
            .await?;
        state.current_user().ok_or(AuthError::ContextClosed)
    }

    async fn settled(
        &self,
        predicate: impl FnMut(&AuthState) -> bool + Send,
    ) -> Result<AuthState, AuthError> {
        if self.is_closed() {
            return Err(AuthError::ContextClosed);
        }
        let mut rx = self.inner.state.clone();
        let published = tokio::time::timeout(SETTLE_TIMEOUT, async move {
            rx.wait_for(predicate).await.map(|state| state.clone())
        })
        .await;

        match published {
            Ok(Ok(state)) => Ok(state),
            Ok(Err(_)) => Err(AuthError::ContextClosed),
            Err(_) => {
                tracing::warn!("Auth state did not settle within {SETTLE_TIMEOUT:?}");
                Err(AuthError::ContextClosed)
            }
        }
    }
}

struct Writer {
    store: Arc<SessionStore>,
    tables: Arc<dyn TableStore>,
    tx: watch::Sender<AuthState>,
    cancel: CancellationToken,
}

impl Writer {
    async fn run(self, mut events: broadcast::Receiver<SessionEvent>) {
        let initial = self.store.initial_session();
        tokio::pin!(initial);
        let mut initial_pending = true;

        loop {
            let session = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                session = &mut initial, if initial_pending => {
                    initial_pending = false;
                    session
                }
                event = events.recv() => {
                    if initial_pending {
                        tracing::debug!("Session changed before initial fetch, discarding it");
                        initial_pending = false;
                    }
                    match event {
                        Ok(event) => event.session().cloned(),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Session events lagged, re-reading store");
                            self.store.current().await
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            };

            let Some(state) = self.resolve(session).await else {
                break;
            };
            if self.cancel.is_cancelled() {
                break;
            }
            self.tx.send_replace(state);
        }

        tracing::debug!("Auth context writer stopped");
    }

    /// Pair `session` with its role. `None` if cancelled meanwhile.
    async fn resolve(&self, session: Option<AuthSession>) -> Option<AuthState> {
        let role = match &session {
            Some(session) => {
                let lookup = resolve_role(
                    self.tables.as_ref(),
                    session.user.id,
                    Some(&session.access_token),
                );
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => return None,
                    role = lookup => Some(role),
                }
            }
            None => None,
        };

        Some(AuthState {
            session,
            role,
            loading: false,
        })
    }
}
