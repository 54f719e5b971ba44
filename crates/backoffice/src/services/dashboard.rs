//! Dashboard data layer.
//!
//! Reads featured wines, the 86'd list and today's happy hour special from the
//! hosted tables. Results are cached per client for five minutes. The 86'd
//! list is read fresh on every page load and after every realtime
//! notification (see [`super::live`]).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Weekday;
use moka::future::Cache;
use secrecy::SecretString;
use tracing::instrument;

use table1837_core::{
    DisplaySpecial, HappyHourSpecial, Item86, Wine, day_index, default_special, resolve_special,
};

use crate::backend::{BackendError, TableQuery, TableStore, select, select_single};

pub const WINES_TABLE: &str = "wines";
pub const ITEMS_86_TABLE: &str = "items_86";
pub const SPECIALS_TABLE: &str = "happy_hour_specials";

const FEATURED_WINE_COUNT: usize = 2;

// =============================================================================
// Query cache
// =============================================================================

/// Cached dashboard reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DashboardQuery {
    FeaturedWines,
    Items86,
    /// Active special for a day index (0 = Sunday).
    TodaySpecial(u8),
}

#[derive(Debug, Clone)]
enum CachedValue {
    Wines(Arc<Vec<Wine>>),
    Items86(Arc<Vec<Item86>>),
    Special(Option<Arc<HappyHourSpecial>>),
}

/// Per-client cache of dashboard reads.
#[derive(Clone)]
pub struct QueryCache {
    cache: Cache<DashboardQuery, CachedValue>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    /// Cache with the default five-minute freshness window.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(300))
    }

    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder().max_capacity(16).time_to_live(ttl).build(),
        }
    }

    /// Drop a cached read so the next request refetches it.
    pub async fn invalidate(&self, query: DashboardQuery) {
        self.cache.invalidate(&query).await;
    }

    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    pub async fn contains(&self, query: DashboardQuery) -> bool {
        self.cache.get(&query).await.is_some()
    }
}

// =============================================================================
// Retry policy
// =============================================================================

/// Retry schedule for table reads.
///
/// Only transient failures are retried (see [`BackendError::is_retryable`]).
/// The delay doubles from `base_delay` up to `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op`, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted, or the first
    /// non-retryable error.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, BackendError>> + Send,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    let delay = self.delay(attempt);
                    tracing::debug!(
                        attempt = attempt + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Retrying {what}: {e}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// =============================================================================
// Dashboard service
// =============================================================================

/// What the dashboard shows. Each panel degrades on its own.
#[derive(Debug, Clone)]
pub struct DashboardData {
    /// `None` when the read failed.
    pub wines: Option<Arc<Vec<Wine>>>,
    /// `None` when the read failed.
    pub items_86: Option<Arc<Vec<Item86>>>,
    /// Stored special for today, else the fallback for the weekday.
    pub special: Option<DisplaySpecial>,
}

/// Reads the three dashboard views.
#[derive(Clone)]
pub struct DashboardService {
    tables: Arc<dyn TableStore>,
    retry: RetryPolicy,
}

impl DashboardService {
    #[must_use]
    pub fn new(tables: Arc<dyn TableStore>, retry: RetryPolicy) -> Self {
        Self { tables, retry }
    }

    /// The two most recently added wines.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails after retries.
    #[instrument(skip_all)]
    pub async fn featured_wines(
        &self,
        cache: &QueryCache,
        access_token: Option<&SecretString>,
    ) -> Result<Arc<Vec<Wine>>, BackendError> {
        if let Some(CachedValue::Wines(wines)) = cache.cache.get(&DashboardQuery::FeaturedWines).await
        {
            return Ok(wines);
        }

        let query = TableQuery::from(WINES_TABLE)
            .order_desc("created_at")
            .limit(FEATURED_WINE_COUNT);
        let wines = Arc::new(
            self.retry
                .run("featured wines", || {
                    select::<Wine>(self.tables.as_ref(), &query, access_token)
                })
                .await?,
        );

        cache
            .cache
            .insert(
                DashboardQuery::FeaturedWines,
                CachedValue::Wines(Arc::clone(&wines)),
            )
            .await;
        Ok(wines)
    }

    /// Every 86'd item, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails after retries.
    #[instrument(skip_all)]
    pub async fn items_86(
        &self,
        cache: &QueryCache,
        access_token: Option<&SecretString>,
    ) -> Result<Arc<Vec<Item86>>, BackendError> {
        if let Some(CachedValue::Items86(items)) = cache.cache.get(&DashboardQuery::Items86).await {
            return Ok(items);
        }

        let query = TableQuery::from(ITEMS_86_TABLE).order_desc("created_at");
        let items = Arc::new(
            self.retry
                .run("86'd items", || {
                    select::<Item86>(self.tables.as_ref(), &query, access_token)
                })
                .await?,
        );

        cache
            .cache
            .insert(DashboardQuery::Items86, CachedValue::Items86(Arc::clone(&items)))
            .await;
        Ok(items)
    }

    /// Drop the cached 86'd list and read it again.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails after retries.
    pub async fn refresh_items_86(
        &self,
        cache: &QueryCache,
        access_token: Option<&SecretString>,
    ) -> Result<Arc<Vec<Item86>>, BackendError> {
        cache.invalidate(DashboardQuery::Items86).await;
        self.items_86(cache, access_token).await
    }

    /// The active special stored for `weekday`, if there is one.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails after retries. No matching row is
    /// not an error.
    #[instrument(skip(self, cache, access_token))]
    pub async fn today_special(
        &self,
        cache: &QueryCache,
        weekday: Weekday,
        access_token: Option<&SecretString>,
    ) -> Result<Option<Arc<HappyHourSpecial>>, BackendError> {
        let day = day_index(weekday);
        let key = DashboardQuery::TodaySpecial(day);
        if let Some(CachedValue::Special(special)) = cache.cache.get(&key).await {
            return Ok(special);
        }

        let query = TableQuery::from(SPECIALS_TABLE)
            .eq("day_of_week", day)
            .eq("active", true);
        let special = match self
            .retry
            .run("today's special", || {
                select_single::<HappyHourSpecial>(self.tables.as_ref(), &query, access_token)
            })
            .await
        {
            Ok(special) => Some(Arc::new(special)),
            Err(BackendError::NoRows) => None,
            Err(e) => return Err(e),
        };

        cache
            .cache
            .insert(key, CachedValue::Special(special.clone()))
            .await;
        Ok(special)
    }

    /// Read all three panels concurrently. The 86'd list bypasses the cache.
    pub async fn load(
        &self,
        cache: &QueryCache,
        weekday: Weekday,
        access_token: Option<&SecretString>,
    ) -> DashboardData {
        let (wines_result, items_result, special_result) = tokio::join!(
            self.featured_wines(cache, access_token),
            self.refresh_items_86(cache, access_token),
            self.today_special(cache, weekday, access_token),
        );

        let wines = match wines_result {
            Ok(wines) => Some(wines),
            Err(e) => {
                tracing::error!("Failed to fetch featured wines: {e}");
                None
            }
        };

        let items_86 = match items_result {
            Ok(items) => Some(items),
            Err(e) => {
                tracing::error!("Failed to fetch 86'd items: {e}");
                None
            }
        };

        let special = match special_result {
            Ok(record) => resolve_special(record.as_deref(), weekday),
            Err(e) => {
                tracing::error!("Failed to fetch today's special: {e}");
                default_special(weekday)
            }
        };

        DashboardData {
            wines,
            items_86,
            special,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::backend::testing::FakeTables;

    fn wine(name: &str, created_at: &str) -> serde_json::Value {
        json!({
            "id": uuid::Uuid::new_v4(),
            "name": name,
            "price": "42",
            "category": "red",
            "created_at": created_at,
        })
    }

    fn item(name: &str, created_at: &str) -> serde_json::Value {
        json!({
            "id": uuid::Uuid::new_v4(),
            "name": name,
            "created_at": created_at,
        })
    }

    fn special(day: u8, active: bool) -> serde_json::Value {
        json!({
            "id": uuid::Uuid::new_v4(),
            "name": "Oyster Hour",
            "description": "Half-price oysters",
            "price": "$1.50 each",
            "day_of_week": day,
            "start_time": "4p",
            "end_time": "6p",
            "active": active,
            "created_at": "2024-05-01T12:00:00Z",
        })
    }

    fn service(tables: &Arc<FakeTables>) -> DashboardService {
        DashboardService::new(tables.clone(), RetryPolicy::none())
    }

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(10), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_retry_stops_after_limit() {
        let policy = RetryPolicy {
            retries: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        };
        let mut calls = 0;
        let result: Result<(), _> = policy
            .run("test", || {
                calls += 1;
                async { Err(BackendError::RateLimited(1)) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls, 4);
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_not_retried() {
        let policy = RetryPolicy {
            retries: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        };
        let mut calls = 0;
        let result: Result<(), _> = policy
            .run("test", || {
                calls += 1;
                async { Err(BackendError::NoRows) }
            })
            .await;

        assert!(matches!(result, Err(BackendError::NoRows)));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_featured_wines_are_two_newest() {
        let tables = Arc::new(FakeTables::new());
        tables.insert(WINES_TABLE, wine("Oldest", "2024-01-01T00:00:00Z"));
        tables.insert(WINES_TABLE, wine("Newest", "2024-03-01T00:00:00Z"));
        tables.insert(WINES_TABLE, wine("Middle", "2024-02-01T00:00:00Z"));

        let wines = service(&tables)
            .featured_wines(&QueryCache::new(), None)
            .await
            .unwrap();

        let names: Vec<_> = wines.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, ["Newest", "Middle"]);
    }

    #[tokio::test]
    async fn test_cached_read_skips_table() {
        let tables = Arc::new(FakeTables::new());
        tables.insert(ITEMS_86_TABLE, item("Lime", "2024-01-01T00:00:00Z"));
        let cache = QueryCache::new();
        let service = service(&tables);

        service.items_86(&cache, None).await.unwrap();
        service.items_86(&cache, None).await.unwrap();
        assert_eq!(tables.calls(ITEMS_86_TABLE), 1);

        service.refresh_items_86(&cache, None).await.unwrap();
        assert_eq!(tables.calls(ITEMS_86_TABLE), 2);
    }

    #[tokio::test]
    async fn test_page_load_rereads_86_list() {
        let tables = Arc::new(FakeTables::new());
        let cache = QueryCache::new();
        let service = service(&tables);

        let first = service.load(&cache, Weekday::Mon, None).await;
        assert!(first.items_86.unwrap().is_empty());

        // Added while nothing was listening for changes
        tables.insert(ITEMS_86_TABLE, item("Short Rib", "2024-01-01T00:00:00Z"));

        let second = service.load(&cache, Weekday::Mon, None).await;
        assert_eq!(second.items_86.unwrap()[0].name, "Short Rib");
        assert_eq!(tables.calls(ITEMS_86_TABLE), 2);
        assert_eq!(tables.calls(WINES_TABLE), 1);
    }

    #[tokio::test]
    async fn test_stored_special_wins() {
        let tables = Arc::new(FakeTables::new());
        tables.insert(SPECIALS_TABLE, special(1, true));

        let data = service(&tables)
            .load(&QueryCache::new(), Weekday::Mon, None)
            .await;

        let special = data.special.unwrap();
        assert_eq!(special.name, "Oyster Hour");
        assert_eq!(special.price, "$1.50 each");
    }

    #[tokio::test]
    async fn test_inactive_special_uses_fallback() {
        let tables = Arc::new(FakeTables::new());
        tables.insert(SPECIALS_TABLE, special(0, false));

        let data = service(&tables)
            .load(&QueryCache::new(), Weekday::Sun, None)
            .await;

        assert_eq!(data.special.unwrap().name, "Sunday Steak Night");
    }

    #[tokio::test]
    async fn test_no_special_on_tuesday() {
        let tables = Arc::new(FakeTables::new());

        let data = service(&tables)
            .load(&QueryCache::new(), Weekday::Tue, None)
            .await;

        assert!(data.special.is_none());
    }

    #[tokio::test]
    async fn test_panels_degrade_independently() {
        let tables = Arc::new(FakeTables::new());
        tables.insert(ITEMS_86_TABLE, item("Lime", "2024-01-01T00:00:00Z"));
        tables.fail(WINES_TABLE, 500);
        tables.fail(SPECIALS_TABLE, 500);

        let data = service(&tables)
            .load(&QueryCache::new(), Weekday::Fri, None)
            .await;

        assert!(data.wines.is_none());
        assert_eq!(data.items_86.unwrap().len(), 1);
        assert_eq!(data.special.unwrap().name, "Late Night Happy Hour");
    }
}
