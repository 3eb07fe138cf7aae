use crate::cache::QueryCache;
use config::{Config, Environment, File};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_per_second")]
    pub per_second: u64,
    #[serde(default = "default_rate_burst_size")]
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: default_rate_per_second(),
            burst_size: default_rate_burst_size(),
        }
    }
}

fn default_rate_per_second() -> u64 {
    20
}
fn default_rate_burst_size() -> u32 {
    40
}

/// Tunable parameters of the aggregation engine. Held as an immutable
/// snapshot behind [`ConfigStore`]; handlers read a whole snapshot, never
/// individual fields through the lock.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub session_duration: SessionDurationConfig,
    #[serde(default)]
    pub user_journeys: UserJourneysConfig,
    #[serde(default)]
    pub trends: TrendsConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionDurationConfig {
    #[serde(default = "default_period_days")]
    pub default_period_days: i64,
    #[serde(default = "default_duration_max_sessions")]
    pub max_sessions_to_analyze: i64,
    #[serde(default = "default_buckets")]
    pub buckets: Vec<BucketSpec>,
    #[serde(default = "default_duration_cache_timeout")]
    pub cache_timeout_ms: u64,
}

impl Default for SessionDurationConfig {
    fn default() -> Self {
        Self {
            default_period_days: default_period_days(),
            max_sessions_to_analyze: default_duration_max_sessions(),
            buckets: default_buckets(),
            cache_timeout_ms: default_duration_cache_timeout(),
        }
    }
}

/// One histogram bucket. `max` is the inclusive upper bound in seconds;
/// `None` marks the final, unbounded bucket.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BucketSpec {
    pub max: Option<u64>,
    pub label: String,
    pub color: String,
}

fn default_buckets() -> Vec<BucketSpec> {
    let spec = |max: Option<u64>, label: &str, color: &str| BucketSpec {
        max,
        label: label.to_string(),
        color: color.to_string(),
    };
    vec![
        spec(Some(30), "under 30 sec", "#ef4444"),
        spec(Some(60), "30-60 sec", "#f97316"),
        spec(Some(180), "1-3 min", "#eab308"),
        spec(Some(600), "3-10 min", "#22c55e"),
        spec(Some(1800), "10-30 min", "#3b82f6"),
        spec(Some(3600), "30-60 min", "#8b5cf6"),
        spec(None, "over 1 hour", "#ec4899"),
    ]
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UserJourneysConfig {
    #[serde(default = "default_period_days")]
    pub default_period_days: i64,
    #[serde(default = "default_journeys_max_sessions")]
    pub max_sessions_to_analyze: i64,
    #[serde(default = "default_min_steps")]
    pub min_steps: usize,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_max_paths_to_show")]
    pub max_paths_to_show: usize,
    #[serde(default = "default_journeys_cache_timeout")]
    pub cache_timeout_ms: u64,
}

impl Default for UserJourneysConfig {
    fn default() -> Self {
        Self {
            default_period_days: default_period_days(),
            max_sessions_to_analyze: default_journeys_max_sessions(),
            min_steps: default_min_steps(),
            max_steps: default_max_steps(),
            max_paths_to_show: default_max_paths_to_show(),
            cache_timeout_ms: default_journeys_cache_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TrendsConfig {
    #[serde(default = "default_period_days")]
    pub default_period_days: i64,
    #[serde(default = "default_max_data_points")]
    pub max_data_points: i64,
    #[serde(default = "default_trends_update_interval")]
    pub update_interval_ms: u64,
    #[serde(default = "default_trend_metrics")]
    pub metrics: Vec<TrendMetric>,
}

impl Default for TrendsConfig {
    fn default() -> Self {
        Self {
            default_period_days: default_period_days(),
            max_data_points: default_max_data_points(),
            update_interval_ms: default_trends_update_interval(),
            metrics: default_trend_metrics(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TrendMetric {
    pub key: String,
    pub label: String,
    pub color: String,
}

fn default_trend_metrics() -> Vec<TrendMetric> {
    let metric = |key: &str, label: &str, color: &str| TrendMetric {
        key: key.to_string(),
        label: label.to_string(),
        color: color.to_string(),
    };
    vec![
        metric("sessions", "Sessions", "#3b82f6"),
        metric("duration", "Avg duration", "#10b981"),
        metric("pageViews", "Page views", "#f59e0b"),
        metric("bounceRate", "Bounce rate", "#ef4444"),
        metric("users", "Unique users", "#8b5cf6"),
    ]
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PerformanceConfig {
    #[serde(default = "default_enable_caching")]
    pub enable_caching: bool,
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_ms: u64,
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            enable_caching: default_enable_caching(),
            cache_size: default_cache_size(),
            batch_size: default_batch_size(),
            query_timeout_ms: default_query_timeout(),
            max_concurrent_queries: default_max_concurrent_queries(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_export_max_records")]
    pub max_records: usize,
    #[serde(default = "default_export_formats")]
    pub formats: Vec<String>,
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_records: default_export_max_records(),
            formats: default_export_formats(),
            compression_level: default_compression_level(),
        }
    }
}

fn default_period_days() -> i64 {
    30
}
fn default_duration_max_sessions() -> i64 {
    10_000
}
fn default_duration_cache_timeout() -> u64 {
    15 * 60 * 1000
}
fn default_journeys_max_sessions() -> i64 {
    5_000
}
fn default_min_steps() -> usize {
    2
}
fn default_max_steps() -> usize {
    10
}
fn default_max_paths_to_show() -> usize {
    15
}
fn default_journeys_cache_timeout() -> u64 {
    10 * 60 * 1000
}
fn default_max_data_points() -> i64 {
    90
}
fn default_trends_update_interval() -> u64 {
    5 * 60 * 1000
}
fn default_enable_caching() -> bool {
    true
}
fn default_cache_size() -> usize {
    100
}
fn default_batch_size() -> usize {
    1000
}
fn default_query_timeout() -> u64 {
    30_000
}
fn default_max_concurrent_queries() -> usize {
    5
}
fn default_export_max_records() -> usize {
    50_000
}
fn default_export_formats() -> Vec<String> {
    vec!["csv".to_string(), "json".to_string(), "pdf".to_string()]
}
fn default_compression_level() -> u32 {
    6
}

/// Partial engine-config override. Merging is shallow: a section that is
/// present replaces the stored section wholesale, including fields the
/// caller left at their defaults. Callers replacing a nested section must
/// send the whole section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigPatch {
    pub session_duration: Option<SessionDurationConfig>,
    pub user_journeys: Option<UserJourneysConfig>,
    pub trends: Option<TrendsConfig>,
    pub performance: Option<PerformanceConfig>,
    pub export: Option<ExportConfig>,
}

/// Shared, atomically replaceable engine configuration. Readers take a full
/// snapshot; `update` swaps in a new snapshot and flushes the query cache,
/// since cached results may have been computed under stale bounds.
pub struct ConfigStore {
    inner: RwLock<Arc<EngineConfig>>,
}

impl ConfigStore {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            inner: RwLock::new(Arc::new(config)),
        }
    }

    pub fn snapshot(&self) -> Arc<EngineConfig> {
        self.inner.read().clone()
    }

    pub fn update(&self, patch: ConfigPatch, cache: &QueryCache) -> Arc<EngineConfig> {
        let mut next = (*self.snapshot()).clone();
        if let Some(section) = patch.session_duration {
            next.session_duration = section;
        }
        if let Some(section) = patch.user_journeys {
            next.user_journeys = section;
        }
        if let Some(section) = patch.trends {
            next.trends = section;
        }
        if let Some(section) = patch.performance {
            next.performance = section;
        }
        if let Some(section) = patch.export {
            next.export = section;
        }
        let next = Arc::new(next);
        *self.inner.write() = next.clone();
        cache.clear();
        next
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();

        let path = config_path.unwrap_or("config.toml");
        builder = builder.add_source(File::with_name(path).required(false));

        // Overlay with environment variables (MEANDER__SERVER__PORT=3001, etc.)
        builder = builder.add_source(
            Environment::with_prefix("MEANDER")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_buckets_end_unbounded() {
        let buckets = default_buckets();
        assert_eq!(buckets.len(), 7);
        assert_eq!(buckets[0].max, Some(30));
        assert_eq!(buckets.last().unwrap().max, None);
    }

    #[test]
    fn test_update_replaces_whole_section() {
        let store = ConfigStore::new(EngineConfig::default());
        let cache = QueryCache::new();

        let patch = ConfigPatch {
            session_duration: Some(SessionDurationConfig {
                default_period_days: 60,
                ..Default::default()
            }),
            ..Default::default()
        };
        let next = store.update(patch, &cache);

        assert_eq!(next.session_duration.default_period_days, 60);
        // Untouched sections survive the swap.
        assert_eq!(next.user_journeys.max_sessions_to_analyze, 5_000);
    }

    #[test]
    fn test_update_clears_cache() {
        let store = ConfigStore::new(EngineConfig::default());
        let cache = QueryCache::new();
        let config = store.snapshot();

        cache.set("trends:{}".to_string(), serde_json::json!(1), &config);
        assert!(cache.get("trends:{}", &config).is_some());

        store.update(ConfigPatch::default(), &cache);
        assert!(cache.get("trends:{}", &store.snapshot()).is_none());
    }
}
