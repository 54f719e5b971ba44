//! Route guard and authentication extractors.
//!
//! Guarded routers are wrapped with [`require_session`] as a `route_layer`.
//! The guard resolves the browser's auth context and either renders the
//! loading page, redirects to login, or passes the request on with the
//! [`CurrentUser`] in its extensions.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use tower_sessions::Session;

use super::client::{load_client, sync_persisted};
use crate::error::{AppError, set_sentry_user};
use crate::services::{AuthError, AuthState, CurrentUser};
use crate::state::AppState;

/// Where unauthenticated requests are sent.
pub const LOGIN_PATH: &str = "/";

/// What the guard does with a request, given the client's auth state.
#[derive(Debug, Clone)]
pub enum GuardDecision {
    /// The first session resolution has not finished.
    Loading,
    /// No session: render nothing, send the browser to login.
    RedirectToLogin,
    /// Signed in with a resolved role.
    Render(CurrentUser),
}

impl GuardDecision {
    #[must_use]
    pub fn from_state(state: &AuthState) -> Self {
        if state.loading {
            return Self::Loading;
        }
        match state.current_user() {
            Some(user) => Self::Render(user),
            // Session without a role yet: the writer is still resolving it
            None if state.session.is_some() => Self::Loading,
            None => Self::RedirectToLogin,
        }
    }
}

/// Placeholder page served while the auth context loads.
#[derive(Template, WebTemplate)]
#[template(path = "loading.html")]
pub struct LoadingTemplate {
    pub refresh_to: String,
}

/// Redirect to login. HTMX-style partial requests get an `HX-Redirect`
/// header so the whole page navigates.
fn redirect_to_login(is_partial: bool) -> Response {
    if is_partial {
        let mut response = StatusCode::NO_CONTENT.into_response();
        response
            .headers_mut()
            .insert("hx-redirect", HeaderValue::from_static(LOGIN_PATH));
        response
    } else {
        Redirect::to(LOGIN_PATH).into_response()
    }
}

/// Guard middleware for routes that need a signed-in user.
///
/// # Errors
///
/// Returns an error if the cookie session cannot be read or written.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let session = request
        .extensions()
        .get::<Session>()
        .cloned()
        .ok_or_else(|| AppError::Internal("session layer missing".to_string()))?;
    let client = load_client(&session, state.clients()).await?;

    let mut auth_state = client.auth.wait_ready(state.guard_grace()).await;
    if let Some(current) = &auth_state.session
        && current.is_expired_at(Utc::now())
    {
        match client.auth.refresh().await {
            Ok(_) => {}
            Err(AuthError::Backend(e)) => {
                tracing::warn!(error = %e, "Token refresh failed, keeping current session");
            }
            Err(e) => tracing::debug!(error = %e, "Token refresh rejected"),
        }
        auth_state = client.auth.snapshot();
    }
    sync_persisted(&session, &auth_state).await?;

    match GuardDecision::from_state(&auth_state) {
        GuardDecision::Loading => {
            let refresh_to = request
                .uri()
                .path_and_query()
                .map_or_else(|| request.uri().path().to_string(), ToString::to_string);
            Ok(LoadingTemplate { refresh_to }.into_response())
        }
        GuardDecision::RedirectToLogin => {
            let is_partial = request.headers().contains_key("hx-request");
            Ok(redirect_to_login(is_partial))
        }
        GuardDecision::Render(user) => {
            set_sentry_user(&user.user_id().to_string(), Some(user.email()));
            request.extensions_mut().insert(user);
            request.extensions_mut().insert(client);
            Ok(next.run(request).await)
        }
    }
}

/// Extractor for the user the guard let through.
///
/// Only valid behind [`require_session`]; elsewhere it redirects to login.
pub struct RequireSession(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireSession
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .map(Self)
            .ok_or_else(|| Redirect::to(LOGIN_PATH).into_response())
    }
}

/// Extractor that additionally requires the `admin` role.
pub struct RequireAdmin(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireSession(user) = RequireSession::from_request_parts(parts, state).await?;
        if user.is_admin() {
            Ok(Self(user))
        } else {
            tracing::info!(role = %user.role, path = %parts.uri.path(), "Admin page refused");
            Err(AppError::Forbidden("Admin access required".to_string()).into_response())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use secrecy::SecretString;

    use table1837_core::{Role, UserId};

    use super::*;
    use crate::backend::{AuthSession, AuthUser};

    fn session() -> AuthSession {
        AuthSession {
            access_token: SecretString::from("access".to_string()),
            refresh_token: SecretString::from("refresh".to_string()),
            expires_at: Utc::now() + Duration::hours(1),
            user: AuthUser {
                id: UserId::new(uuid::Uuid::new_v4()),
                email: Some("host@table1837.test".to_string()),
            },
        }
    }

    #[test]
    fn test_loading_state_waits() {
        let state = AuthState {
            session: None,
            role: None,
            loading: true,
        };
        assert!(matches!(
            GuardDecision::from_state(&state),
            GuardDecision::Loading
        ));
    }

    #[test]
    fn test_no_session_redirects() {
        let state = AuthState {
            session: None,
            role: None,
            loading: false,
        };
        assert!(matches!(
            GuardDecision::from_state(&state),
            GuardDecision::RedirectToLogin
        ));
    }

    #[test]
    fn test_session_with_role_renders() {
        let state = AuthState {
            session: Some(session()),
            role: Some(Role::Staff),
            loading: false,
        };
        let GuardDecision::Render(user) = GuardDecision::from_state(&state) else {
            panic!("expected render");
        };
        assert_eq!(user.role, Role::Staff);
        assert_eq!(user.email(), "host@table1837.test");
    }

    #[test]
    fn test_session_without_role_is_still_loading() {
        let state = AuthState {
            session: Some(session()),
            role: None,
            loading: false,
        };
        assert!(matches!(
            GuardDecision::from_state(&state),
            GuardDecision::Loading
        ));
    }

    #[test]
    fn test_partial_redirect_uses_header() {
        let response = redirect_to_login(true);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers().get("hx-redirect").unwrap(), "/");

        let response = redirect_to_login(false);
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get("location").unwrap(), "/");
    }
}
