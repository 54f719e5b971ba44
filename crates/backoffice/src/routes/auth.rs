//! Login and logout.
//!
//! The login page lives at `/`. A browser that is already signed in is sent
//! straight to the dashboard.

use askama::Template;
use axum::{
    Form, Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use secrecy::SecretString;
use serde::Deserialize;
use tracing::instrument;

use crate::error::{AppError, clear_sentry_user, set_sentry_user};
use crate::middleware::{Client, sync_persisted};
use crate::services::AuthError;
use crate::state::AppState;

/// Where a successful sign-in lands.
pub const AFTER_LOGIN_PATH: &str = "/dashboard";

/// Login page template.
#[derive(Template)]
#[template(path = "auth/login.html")]
struct LoginTemplate {
    email: String,
    error: Option<String>,
}

/// Login form data.
#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginForm")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Build the auth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(login_page).post(login))
        .route("/logout", post(logout))
}

fn render_login(email: String, error: Option<String>) -> Html<String> {
    Html(LoginTemplate { email, error }.render().unwrap_or_else(|e| {
        tracing::error!("Template render error: {}", e);
        "Internal Server Error".to_string()
    }))
}

const fn login_status(error: &AuthError) -> StatusCode {
    match error {
        AuthError::InvalidCredentials(_) | AuthError::NoSession => StatusCode::UNAUTHORIZED,
        AuthError::InvalidEmail(_) => StatusCode::BAD_REQUEST,
        AuthError::ContextClosed => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::Backend(_) => StatusCode::BAD_GATEWAY,
    }
}

/// Render the login page.
///
/// GET /
#[instrument(skip_all)]
async fn login_page(
    State(state): State<AppState>,
    client: Client,
) -> Result<Response, AppError> {
    let auth_state = client.context.auth.wait_ready(state.guard_grace()).await;
    sync_persisted(&client.session, &auth_state).await?;

    if auth_state.current_user().is_some() {
        return Ok(Redirect::to(AFTER_LOGIN_PATH).into_response());
    }
    Ok(render_login(String::new(), None).into_response())
}

/// Sign in with email and password.
///
/// POST /
#[instrument(skip_all)]
async fn login(
    State(state): State<AppState>,
    client: Client,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let password = SecretString::from(form.password);

    let result = client.context.auth.sign_in(form.email.trim(), &password).await;

    match result {
        Ok(user) => {
            sync_persisted(&client.session, &client.context.auth.snapshot()).await?;
            set_sentry_user(&user.user_id().to_string(), Some(user.email()));
            tracing::info!(email = %user.email(), role = %user.role, "Signed in");
            Ok(Redirect::to(AFTER_LOGIN_PATH).into_response())
        }
        Err(e) => {
            match &e {
                AuthError::Backend(_) | AuthError::ContextClosed => {
                    tracing::error!("Sign-in failed: {e}");
                }
                _ => tracing::info!(email = %form.email, error = %e, "Sign-in rejected"),
            }
            let status = login_status(&e);
            // Server errors leave the cookie unset, so a new context could
            // never be found again
            if status.is_server_error() && client.session.id().is_none() {
                state.clients().remove(client.context.id).await;
            }
            Ok((status, render_login(form.email, Some(e.login_message()))).into_response())
        }
    }
}

/// Sign out and return to the login page.
///
/// POST /logout
#[instrument(skip_all)]
async fn logout(client: Client) -> Result<Redirect, AppError> {
    if let Err(e) = client.context.auth.sign_out().await {
        tracing::warn!("Sign-out did not settle: {e}");
    }
    sync_persisted(&client.session, &client.context.auth.snapshot()).await?;
    client.context.queries.invalidate_all().await;
    clear_sentry_user();

    Ok(Redirect::to("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;

    #[test]
    fn test_login_status() {
        assert_eq!(
            login_status(&AuthError::InvalidCredentials("Invalid login credentials".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            login_status(&AuthError::Backend(BackendError::NoRows)),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_form_debug_hides_password() {
        let form = LoginForm {
            email: "host@table1837.test".to_string(),
            password: "hunter2".to_string(),
        };
        assert!(!format!("{form:?}").contains("hunter2"));
    }

    #[test]
    fn test_login_page_keeps_email_and_error() {
        let html = LoginTemplate {
            email: "host@table1837.test".to_string(),
            error: Some("Invalid login credentials".to_string()),
        }
        .render()
        .unwrap_or_default();

        assert!(html.contains("ACCESS INVENTORY SYSTEM"));
        assert!(html.contains("value=\"host@table1837.test\""));
        assert!(html.contains("Invalid login credentials"));
    }
}
