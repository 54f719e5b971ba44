//! Per-client session store over the hosted identity provider.

use std::sync::Arc;

use chrono::Utc;
use secrecy::SecretString;
use tokio::sync::{Mutex, RwLock, broadcast};
use tracing::instrument;

use table1837_core::Email;

use super::error::{AuthError, from_sign_in};
use crate::backend::{AuthSession, IdentityProvider};

const EVENT_CAPACITY: usize = 16;

/// A change to the client's session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    SignedIn(AuthSession),
    SignedOut,
    TokenRefreshed(AuthSession),
}

impl SessionEvent {
    /// The session after this change, if any.
    #[must_use]
    pub const fn session(&self) -> Option<&AuthSession> {
        match self {
            Self::SignedIn(session) | Self::TokenRefreshed(session) => Some(session),
            Self::SignedOut => None,
        }
    }
}

struct StoreState {
    session: Option<AuthSession>,
    /// Bumped on every local change so a slow restore never overwrites a
    /// newer session.
    generation: u64,
}

/// Owns one client's session and broadcasts every change to it.
pub struct SessionStore {
    provider: Arc<dyn IdentityProvider>,
    state: RwLock<StoreState>,
    restored: Mutex<Option<AuthSession>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    /// Create a store, optionally seeded with a session restored from the
    /// client's cookie. The restored session is only trusted after
    /// [`initial_session`](Self::initial_session) validates it.
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>, restored: Option<AuthSession>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            provider,
            state: RwLock::new(StoreState {
                session: None,
                generation: 0,
            }),
            restored: Mutex::new(restored),
            events,
        }
    }

    /// Subscribe to session changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Number of live change subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    pub async fn current(&self) -> Option<AuthSession> {
        self.state.read().await.session.clone()
    }

    /// Resolve the session the client starts with.
    ///
    /// An unexpired restored token is checked with the provider. An expired
    /// or rejected one is exchanged through its refresh token. Any other
    /// outcome leaves the client signed out.
    #[instrument(skip(self))]
    pub async fn initial_session(&self) -> Option<AuthSession> {
        let generation = self.state.read().await.generation;
        let restored = self.restored.lock().await.take();
        let Some(restored) = restored else {
            return self.current().await;
        };

        let (resolved, refreshed) = self.validate(restored).await;

        let mut state = self.state.write().await;
        if state.generation != generation {
            tracing::debug!("Session changed during restore, keeping newer session");
            return state.session.clone();
        }
        state.session.clone_from(&resolved);
        drop(state);

        if refreshed && let Some(session) = &resolved {
            self.publish(SessionEvent::TokenRefreshed(session.clone()));
        }
        resolved
    }

    async fn validate(&self, session: AuthSession) -> (Option<AuthSession>, bool) {
        if !session.is_expired_at(Utc::now()) {
            match self.provider.get_user(&session.access_token).await {
                Ok(user) => return (Some(AuthSession { user, ..session }), false),
                Err(e) if e.is_auth_rejection() => {
                    tracing::debug!("Restored access token rejected, refreshing");
                }
                Err(e) => {
                    tracing::warn!("Failed to validate restored session: {e}");
                    return (None, false);
                }
            }
        }

        match self.provider.refresh_session(&session.refresh_token).await {
            Ok(refreshed) => (Some(refreshed), true),
            Err(e) => {
                tracing::info!("Restored session could not be refreshed: {e}");
                (None, false)
            }
        }
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` before contacting the provider if the
    /// email is malformed, `AuthError::InvalidCredentials` with the provider's
    /// message if it rejects the credentials, or `AuthError::Backend` if it
    /// cannot be reached.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_in(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<AuthSession, AuthError> {
        let email = Email::parse(email)?;
        let session = self
            .provider
            .sign_in_with_password(email.as_str(), password)
            .await
            .map_err(from_sign_in)?;

        self.replace(Some(session.clone())).await;
        self.publish(SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    /// Sign out. The local session is always cleared; a provider failure is
    /// only logged.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) {
        let previous = self.replace(None).await;
        self.publish(SessionEvent::SignedOut);

        if let Some(session) = previous
            && let Err(e) = self.provider.sign_out(&session.access_token).await
        {
            tracing::warn!("Sign-out at identity provider failed: {e}");
        }
    }

    /// Exchange the current refresh token for a new session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NoSession` if signed out, or `AuthError::Backend`
    /// if the refresh failed. A rejected refresh token also signs the client
    /// out.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<AuthSession, AuthError> {
        let current = self.current().await.ok_or(AuthError::NoSession)?;

        match self.provider.refresh_session(&current.refresh_token).await {
            Ok(session) => {
                self.replace(Some(session.clone())).await;
                self.publish(SessionEvent::TokenRefreshed(session.clone()));
                Ok(session)
            }
            Err(e) => {
                if e.is_auth_rejection() {
                    tracing::info!("Refresh token rejected, signing out: {e}");
                    self.replace(None).await;
                    self.publish(SessionEvent::SignedOut);
                }
                Err(AuthError::Backend(e))
            }
        }
    }

    async fn replace(&self, session: Option<AuthSession>) -> Option<AuthSession> {
        let mut state = self.state.write().await;
        state.generation += 1;
        std::mem::replace(&mut state.session, session)
    }

    fn publish(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("No session subscribers");
        }
    }
}
