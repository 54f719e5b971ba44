//! Integration tests for the Table 1837 back office.
//!
//! Most tests drive the full router with `tower::ServiceExt::oneshot` over the
//! in-memory backends from `table1837_backoffice::backend::testing`. Tests
//! marked `#[ignore]` need a running server and hosted backend.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p table1837-integration-tests
//!
//! # Against a running server
//! BACKOFFICE_BASE_URL=http://127.0.0.1:3000 cargo test -p table1837-integration-tests -- --ignored
//! ```

#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use secrecy::SecretString;
use serde_json::json;
use tower::ServiceExt;
use url::Url;

use table1837_backoffice::backend::AuthUser;
use table1837_backoffice::backend::testing::{FakeFeed, FakeIdentity, FakeTables};
use table1837_backoffice::config::{BackendConfig, BackofficeConfig, LogFormat};
use table1837_backoffice::middleware::SESSION_COOKIE_NAME;
use table1837_backoffice::services::RetryPolicy;
use table1837_backoffice::services::auth::role::USER_ROLES_TABLE;
use table1837_backoffice::state::{AppState, Backends, StateOptions};
use table1837_core::Role;

/// Password every test account uses.
pub const PASSWORD: &str = "correct horse battery staple";

/// Configuration pointing at a backend that is never contacted.
#[must_use]
pub fn test_config() -> BackofficeConfig {
    BackofficeConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 3000,
        base_url: "http://127.0.0.1:3000".to_string(),
        backend: BackendConfig {
            url: Url::parse("http://backend.invalid").unwrap(),
            anon_key: SecretString::from("test-anon-key".to_string()),
            request_timeout: Duration::from_secs(5),
        },
        log_format: LogFormat::Text,
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

/// The back office wired to in-memory backends.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub identity: Arc<FakeIdentity>,
    pub tables: Arc<FakeTables>,
    pub feed: Arc<FakeFeed>,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    /// A fresh app with no retries and a short guard grace period.
    #[must_use]
    pub fn new() -> Self {
        let identity = Arc::new(FakeIdentity::new());
        let tables = Arc::new(FakeTables::new());
        let feed = Arc::new(FakeFeed::new());

        let backends = Backends {
            identity: identity.clone(),
            tables: tables.clone(),
            changes: feed.clone(),
        };
        let options = StateOptions {
            retry: RetryPolicy::none(),
            guard_grace: Duration::from_secs(2),
        };
        let state = AppState::with_options(test_config(), backends, options);

        Self {
            router: table1837_backoffice::app(state.clone()),
            state,
            identity,
            tables,
            feed,
        }
    }

    /// Register an account with `role` assigned in the role table.
    pub fn add_user(&self, email: &str, role: Role) -> AuthUser {
        let user = self.identity.add_user(email, PASSWORD);
        self.tables.insert(
            USER_ROLES_TABLE,
            json!({
                "id": uuid::Uuid::new_v4().to_string(),
                "user_id": user.id.to_string(),
                "role": role.as_str(),
                "created_at": chrono::Utc::now().to_rfc3339(),
            }),
        );
        user
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// GET `path`, with the session cookie if given.
    pub async fn get(&self, path: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// POST an urlencoded form to `path`.
    pub async fn post_form(
        &self,
        path: &str,
        fields: &[(&str, &str)],
        cookie: Option<&str>,
    ) -> Response<Body> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    /// Submit the login form. Returns the response and the session cookie.
    ///
    /// Server-error responses carry no cookie, since the session layer does
    /// not save on them.
    pub async fn login(&self, email: &str, password: &str) -> (Response<Body>, Option<String>) {
        let response = self
            .post_form("/", &[("email", email), ("password", password)], None)
            .await;
        let cookie = session_cookie(&response);
        (response, cookie)
    }

    /// Sign in an account that was registered with [`add_user`](Self::add_user).
    pub async fn signed_in(&self, email: &str) -> String {
        let (response, cookie) = self.login(email, PASSWORD).await;
        assert_eq!(location(&response).as_deref(), Some("/dashboard"));
        cookie.expect("login response sets the session cookie")
    }
}

/// The `name=value` pair of the session cookie set by `response`.
#[must_use]
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .find(|pair| pair.starts_with(&format!("{SESSION_COOKIE_NAME}=")))
        .map(ToString::to_string)
}

/// The redirect target of `response`, if any.
#[must_use]
pub fn location(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
