pub mod handler;
pub mod journeys;
pub mod session_duration;
pub mod titles;
pub mod types;
pub mod validate;

use crate::cache::QueryCache;
use crate::config::{ConfigStore, EngineConfig};
use crate::error::{AppError, AppResult};
use deadpool_sqlite::Pool;
use std::future::Future;
use std::time::Duration;
use titles::TitleCache;
use tokio::sync::Semaphore;

/// Shared state for the analytics endpoints. Constructed once by the
/// composition root and handed to handlers as `Arc<AnalyticsState>`.
pub struct AnalyticsState {
    pub pool: Pool,
    pub config: ConfigStore,
    pub cache: QueryCache,
    pub titles: TitleCache,
    query_gate: Semaphore,
}

impl AnalyticsState {
    pub fn new(pool: Pool, engine: EngineConfig) -> Self {
        let query_gate = Semaphore::new(engine.performance.max_concurrent_queries);
        Self {
            pool,
            config: ConfigStore::new(engine),
            cache: QueryCache::new(),
            titles: TitleCache::new(),
            query_gate,
        }
    }

    /// Run one analysis under the concurrency ceiling and query timeout.
    /// Excess callers queue on the semaphore; a timed-out fetch surfaces as
    /// a store error, never a partial result.
    pub async fn run_query<T, F>(&self, timeout_ms: u64, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        let _permit = self
            .query_gate
            .acquire()
            .await
            .map_err(|_| AppError::Internal("query gate closed".to_string()))?;
        match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Store(format!(
                "query timed out after {timeout_ms} ms"
            ))),
        }
    }
}

/// Parse an RFC 3339 date filter into epoch milliseconds.
pub(crate) fn parse_date_ms(value: Option<&str>) -> AppResult<Option<i64>> {
    match value {
        None => Ok(None),
        Some(s) => chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.timestamp_millis()))
            .map_err(|_| AppError::validation(format!("invalid date: {s}"))),
    }
}
