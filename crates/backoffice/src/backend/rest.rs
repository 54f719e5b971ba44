//! Table store client (PostgREST-style REST).

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use tracing::instrument;
use url::Url;

use super::{BackendError, TableStore, directory_url, parse_json, send};
use crate::config::BackendConfig;

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Sort direction for [`TableQuery::order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// A read against one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    table: String,
    columns: String,
    filters: Vec<(String, String)>,
    order: Option<(String, Order)>,
    limit: Option<usize>,
    single: bool,
}

impl TableQuery {
    /// Start a query selecting every column of `table`.
    #[must_use]
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
            single: false,
        }
    }

    #[must_use]
    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    /// Keep rows where `column` equals `value`.
    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl std::fmt::Display) -> Self {
        self.filters.push((column.into(), value.to_string()));
        self
    }

    #[must_use]
    pub fn order(mut self, column: impl Into<String>, direction: Order) -> Self {
        self.order = Some((column.into(), direction));
        self
    }

    #[must_use]
    pub fn order_desc(self, column: impl Into<String>) -> Self {
        self.order(column, Order::Desc)
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Expect exactly one row back.
    #[must_use]
    pub const fn single(mut self) -> Self {
        self.single = true;
        self
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub const fn is_single(&self) -> bool {
        self.single
    }

    #[must_use]
    pub const fn row_limit(&self) -> Option<usize> {
        self.limit
    }

    /// The value an equality filter on `column` compares against.
    #[must_use]
    pub fn filter(&self, column: &str) -> Option<&str> {
        self.filters
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    /// Column and direction of the sort, if any.
    #[must_use]
    pub fn ordering(&self) -> Option<(&str, Order)> {
        self.order.as_ref().map(|(c, d)| (c.as_str(), *d))
    }

    /// Query-string pairs in PostgREST syntax.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("select".to_string(), self.columns.clone())];
        for (column, value) in &self.filters {
            pairs.push((column.clone(), format!("eq.{value}")));
        }
        if let Some((column, direction)) = &self.order {
            pairs.push(("order".to_string(), format!("{column}.{}", direction.as_str())));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }
}

/// Client for the hosted table store.
#[derive(Clone)]
pub struct TableClient {
    inner: Arc<TableClientInner>,
}

struct TableClientInner {
    client: reqwest::Client,
    rest_url: Url,
    anon_key: SecretString,
}

impl TableClient {
    /// Create a table client for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint URL cannot be built or the HTTP client
    /// fails to build.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let rest_url = directory_url(&config.url, "rest/v1/")?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(TableClientInner {
                client,
                rest_url,
                anon_key: config.anon_key.clone(),
            }),
        })
    }

    fn url_for(&self, query: &TableQuery) -> Result<Url, BackendError> {
        let mut url = self.inner.rest_url.join(query.table())?;
        url.query_pairs_mut().extend_pairs(query.query_pairs());
        Ok(url)
    }
}

#[async_trait]
impl TableStore for TableClient {
    #[instrument(skip(self, access_token), fields(table = %query.table()))]
    async fn fetch(
        &self,
        query: &TableQuery,
        access_token: Option<&SecretString>,
    ) -> Result<serde_json::Value, BackendError> {
        let url = self.url_for(query)?;
        let bearer = access_token.unwrap_or(&self.inner.anon_key);

        let request = self
            .inner
            .client
            .get(url)
            .header("apikey", self.inner.anon_key.expose_secret())
            .header(AUTHORIZATION, format!("Bearer {}", bearer.expose_secret()))
            .header(
                ACCEPT,
                if query.is_single() {
                    SINGLE_OBJECT
                } else {
                    "application/json"
                },
            );

        let body = send(request, "tables").await?;
        parse_json(&body, "tables")
    }
}
