use crate::config::EngineConfig;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Fallback TTL for keys whose prefix matches no known query type.
const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

struct CacheEntry {
    value: Value,
    inserted_at: Instant,
}

/// Bounded query-result cache keyed by `"{query-type}:{sorted-params-json}"`.
///
/// Eviction is strictly insertion-ordered: when the store is at capacity,
/// `set` removes the earliest-inserted live entry, never a recently-read one.
/// TTLs are not stored with entries; they are resolved from the key's
/// query-type prefix against the config snapshot passed to `get`, so a TTL
/// change in configuration retroactively applies to entries already cached.
pub struct QueryCache {
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    insertion_order: VecDeque<String>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                insertion_order: VecDeque::new(),
            }),
        }
    }

    /// Look up a cached result. Misses when caching is disabled, the key is
    /// absent, or the entry has outlived the TTL resolved for its query
    /// type. Expired entries are dropped on the spot.
    pub fn get(&self, key: &str, config: &EngineConfig) -> Option<Value> {
        if !config.performance.enable_caching {
            return None;
        }

        let ttl = ttl_for_key(key, config);
        let mut inner = self.inner.lock();
        let cached = inner
            .entries
            .get(key)
            .map(|entry| (entry.inserted_at, entry.value.clone()));
        match cached {
            Some((inserted_at, value)) if inserted_at.elapsed() < ttl => Some(value),
            Some(_) => {
                // The queue slot goes too, so a later re-insert of this key
                // joins the back of the eviction order.
                inner.entries.remove(key);
                inner.insertion_order.retain(|k| k != key);
                None
            }
            None => None,
        }
    }

    /// Insert a result. No-op when caching is disabled. At capacity, evicts
    /// exactly one entry: the earliest-inserted one still live. Re-setting
    /// an existing key refreshes its value and timestamp but keeps its
    /// original insertion position.
    pub fn set(&self, key: String, value: Value, config: &EngineConfig) {
        if !config.performance.enable_caching {
            return;
        }

        let mut inner = self.inner.lock();
        let now = Instant::now();

        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.value = value;
            entry.inserted_at = now;
            return;
        }

        // The queue and the map always hold the same keys, so the front of
        // the queue is the earliest-inserted live entry.
        if inner.entries.len() >= config.performance.cache_size {
            if let Some(oldest) = inner.insertion_order.pop_front() {
                inner.entries.remove(&oldest);
            }
        }

        inner.insertion_order.push_back(key.clone());
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
            },
        );
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.insertion_order.clear();
    }

    pub fn entry_count(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve the TTL for a key from its query-type prefix. Unknown prefixes
/// fall back to five minutes.
fn ttl_for_key(key: &str, config: &EngineConfig) -> Duration {
    let query_type = key.split(':').next().unwrap_or_default();
    match query_type {
        "session-duration" => Duration::from_millis(config.session_duration.cache_timeout_ms),
        "user-journeys" => Duration::from_millis(config.user_journeys.cache_timeout_ms),
        "trends" => Duration::from_millis(config.trends.update_interval_ms),
        _ => DEFAULT_TTL,
    }
}

/// Build a cache key from a query type and its parameters. Top-level
/// parameter names are sorted before serialization so logically identical
/// queries map to the same key regardless of parameter order.
pub fn cache_key(query_type: &str, params: &Value) -> String {
    let normalized = match params {
        Value::Object(map) => {
            let mut pairs: Vec<(&String, &Value)> = map.iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));
            let sorted: serde_json::Map<String, Value> = pairs
                .into_iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Value::Object(sorted)
        }
        other => other.clone(),
    };
    format!("{query_type}:{normalized}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_with(cache_size: usize, duration_ttl_ms: u64) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.performance.cache_size = cache_size;
        config.session_duration.cache_timeout_ms = duration_ttl_ms;
        config
    }

    #[test]
    fn test_cache_key_is_order_independent() {
        let a = cache_key("session-duration", &json!({ "days": 30, "limit": 1000 }));
        let b = cache_key("session-duration", &json!({ "limit": 1000, "days": 30 }));
        assert_eq!(a, b);
    }

    #[test]
    fn test_get_miss_then_hit_then_clear() {
        let cache = QueryCache::new();
        let config = EngineConfig::default();

        assert!(cache.get("session-duration:k", &config).is_none());
        cache.set("session-duration:k".to_string(), json!({"n": 1}), &config);
        assert_eq!(
            cache.get("session-duration:k", &config),
            Some(json!({"n": 1}))
        );

        cache.clear();
        assert!(cache.get("session-duration:k", &config).is_none());
    }

    #[test]
    fn test_disabled_caching_never_stores() {
        let cache = QueryCache::new();
        let mut config = EngineConfig::default();
        config.performance.enable_caching = false;

        cache.set("session-duration:k".to_string(), json!(1), &config);
        assert_eq!(cache.entry_count(), 0);
        assert!(cache.get("session-duration:k", &config).is_none());
    }

    #[test]
    fn test_at_capacity_evicts_exactly_first_inserted() {
        let cache = QueryCache::new();
        let config = config_with(2, 60_000);

        cache.set("trends:a".to_string(), json!("a"), &config);
        cache.set("trends:b".to_string(), json!("b"), &config);
        cache.set("trends:c".to_string(), json!("c"), &config);

        assert!(cache.get("trends:a", &config).is_none());
        assert_eq!(cache.get("trends:b", &config), Some(json!("b")));
        assert_eq!(cache.get("trends:c", &config), Some(json!("c")));
    }

    #[test]
    fn test_reads_do_not_affect_eviction_order() {
        let cache = QueryCache::new();
        let config = config_with(2, 60_000);

        cache.set("trends:a".to_string(), json!("a"), &config);
        cache.set("trends:b".to_string(), json!("b"), &config);
        // Touch the oldest entry; insertion-order eviction must ignore it.
        assert!(cache.get("trends:a", &config).is_some());
        cache.set("trends:c".to_string(), json!("c"), &config);

        assert!(cache.get("trends:a", &config).is_none());
        assert!(cache.get("trends:b", &config).is_some());
    }

    #[test]
    fn test_overwrite_keeps_insertion_position() {
        let cache = QueryCache::new();
        let config = config_with(2, 60_000);

        cache.set("trends:a".to_string(), json!("a1"), &config);
        cache.set("trends:b".to_string(), json!("b"), &config);
        cache.set("trends:a".to_string(), json!("a2"), &config);
        // "a" keeps its original (oldest) slot, so the next insert evicts it.
        cache.set("trends:c".to_string(), json!("c"), &config);

        assert!(cache.get("trends:a", &config).is_none());
        assert_eq!(cache.get("trends:b", &config), Some(json!("b")));
        assert_eq!(cache.get("trends:c", &config), Some(json!("c")));
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let cache = QueryCache::new();
        let config = config_with(10, 25);

        cache.set("session-duration:k".to_string(), json!(1), &config);
        assert!(cache.get("session-duration:k", &config).is_some());

        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get("session-duration:k", &config).is_none());
    }

    #[test]
    fn test_expired_key_rejoins_the_back_of_the_eviction_order() {
        let cache = QueryCache::new();
        let expiring = config_with(2, 0);
        let config = config_with(2, 60_000);

        cache.set("session-duration:k".to_string(), json!(1), &config);
        // Expired read drops the entry and its queue slot.
        assert!(cache.get("session-duration:k", &expiring).is_none());

        cache.set("trends:a".to_string(), json!("a"), &config);
        cache.set("session-duration:k".to_string(), json!(2), &config);
        // "k" was re-inserted after "a", so reaching capacity evicts "a".
        cache.set("trends:b".to_string(), json!("b"), &config);

        assert!(cache.get("trends:a", &config).is_none());
        assert_eq!(cache.get("session-duration:k", &config), Some(json!(2)));
        assert_eq!(cache.get("trends:b", &config), Some(json!("b")));
    }

    #[test]
    fn test_ttl_is_resolved_at_read_time() {
        let cache = QueryCache::new();
        let long_ttl = config_with(10, 60_000);
        let zero_ttl = config_with(10, 0);

        cache.set("session-duration:k".to_string(), json!(1), &long_ttl);
        // Shrinking the configured TTL expires entries cached before the change.
        assert!(cache.get("session-duration:k", &zero_ttl).is_none());
    }
}
