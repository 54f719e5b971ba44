//! Per-browser client lookup.
//!
//! The cookie session carries a client id. The first request from a browser
//! mints one; later requests find the live [`ClientContext`] under it.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;
use uuid::Uuid;

use crate::backend::AuthSession;
use crate::error::AppError;
use crate::models::{PersistedSession, session_keys as keys};
use crate::services::{AuthState, ClientContext, ClientContexts};
use crate::state::AppState;

/// Find or create the context for the browser behind `session`.
///
/// A new context is seeded with the tokens persisted in the cookie session.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn load_client(
    session: &Session,
    clients: &ClientContexts,
) -> Result<ClientContext, AppError> {
    let id = if let Some(id) = session.get::<Uuid>(keys::CLIENT_ID).await? {
        id
    } else {
        let id = Uuid::new_v4();
        session.insert(keys::CLIENT_ID, id).await?;
        id
    };

    if let Some(client) = clients.get(id).await
        && !client.auth.is_closed()
    {
        return Ok(client);
    }

    let restored = session
        .get::<PersistedSession>(keys::AUTH_SESSION)
        .await?
        .map(AuthSession::from);
    Ok(clients.get_or_create(id, restored).await)
}

/// Mirror the context's session into the cookie session, so a client whose
/// context was evicted is rebuilt from it on its next request.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn sync_persisted(session: &Session, state: &AuthState) -> Result<(), AppError> {
    match &state.session {
        Some(current) => {
            let stored = session.get::<PersistedSession>(keys::AUTH_SESSION).await?;
            if !stored.is_some_and(|stored| stored.matches(current)) {
                session
                    .insert(keys::AUTH_SESSION, PersistedSession::from(current))
                    .await?;
            }
        }
        None if !state.loading => {
            session.remove_value(keys::AUTH_SESSION).await?;
        }
        None => {}
    }
    Ok(())
}

fn session_from(parts: &Parts) -> Result<Session, AppError> {
    parts
        .extensions
        .get::<Session>()
        .cloned()
        .ok_or_else(|| AppError::Internal("session layer missing".to_string()))
}

/// Extractor for the browser's client context and its cookie session.
pub struct Client {
    pub context: ClientContext,
    pub session: Session,
}

impl FromRequestParts<AppState> for Client {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // The route guard has already resolved the context
        if let Some(context) = parts.extensions.get::<ClientContext>().cloned() {
            return Ok(Self {
                context,
                session: session_from(parts)?,
            });
        }

        let session = session_from(parts)?;
        let context = load_client(&session, state.clients()).await?;
        Ok(Self { context, session })
    }
}
