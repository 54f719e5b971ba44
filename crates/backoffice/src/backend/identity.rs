//! Identity provider client (GoTrue-style REST).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::instrument;
use url::Url;

use super::{
    AuthSession, AuthUser, BackendError, IdentityProvider, TokenResponse, directory_url,
    parse_json, send,
};
use crate::config::BackendConfig;

/// Client for the hosted identity provider.
#[derive(Clone)]
pub struct IdentityClient {
    inner: Arc<IdentityClientInner>,
}

struct IdentityClientInner {
    client: reqwest::Client,
    auth_url: Url,
    anon_key: SecretString,
}

impl IdentityClient {
    /// Create an identity client for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint URL cannot be built or the HTTP client
    /// fails to build.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let auth_url = directory_url(&config.url, "auth/v1/")?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(IdentityClientInner {
                client,
                auth_url,
                anon_key: config.anon_key.clone(),
            }),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.inner.auth_url.join(path)?)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.inner
            .client
            .request(method, url)
            .header("apikey", self.inner.anon_key.expose_secret())
    }

    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<AuthSession, BackendError> {
        let mut url = self.endpoint("token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);

        let body = send(
            self.request(reqwest::Method::POST, url).json(&body),
            "identity",
        )
        .await?;

        let token: TokenResponse = parse_json(&body, "identity")?;
        Ok(token.into_session(Utc::now()))
    }
}

#[async_trait]
impl IdentityProvider for IdentityClient {
    #[instrument(skip(self, password))]
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<AuthSession, BackendError> {
        self.token_grant(
            "password",
            json!({ "email": email, "password": password.expose_secret() }),
        )
        .await
    }

    #[instrument(skip_all)]
    async fn get_user(&self, access_token: &SecretString) -> Result<AuthUser, BackendError> {
        let url = self.endpoint("user")?;
        let body = send(
            self.request(reqwest::Method::GET, url).header(
                AUTHORIZATION,
                format!("Bearer {}", access_token.expose_secret()),
            ),
            "identity",
        )
        .await?;

        parse_json(&body, "identity")
    }

    #[instrument(skip_all)]
    async fn refresh_session(
        &self,
        refresh_token: &SecretString,
    ) -> Result<AuthSession, BackendError> {
        self.token_grant(
            "refresh_token",
            json!({ "refresh_token": refresh_token.expose_secret() }),
        )
        .await
    }

    #[instrument(skip_all)]
    async fn sign_out(&self, access_token: &SecretString) -> Result<(), BackendError> {
        let url = self.endpoint("logout")?;
        send(
            self.request(reqwest::Method::POST, url).header(
                AUTHORIZATION,
                format!("Bearer {}", access_token.expose_secret()),
            ),
            "identity",
        )
        .await?;
        Ok(())
    }

    async fn health(&self) -> Result<(), BackendError> {
        let url = self.endpoint("health")?;
        send(self.request(reqwest::Method::GET, url), "identity").await?;
        Ok(())
    }
}
