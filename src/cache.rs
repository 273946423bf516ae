//! In-memory response cache with per-lookup TTLs.
//!
//! Time comes from an injected [`Clock`] so expiry can be tested without
//! sleeping.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { now: Mutex::new(Instant::now()) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct ResponseCache {
    entries: Mutex<HashMap<String, (Instant, Value)>>,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    /// The cached value if it was stored less than `ttl` ago.
    pub fn get(&self, key: &str, ttl: Duration) -> Option<Value> {
        let now = self.clock.now();
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|(stored_at, _)| now.saturating_duration_since(*stored_at) < ttl)
            .map(|(_, value)| value.clone())
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.into(), (now, value));
    }

    pub fn invalidate(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
    }

    /// Drop every key starting with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|key, _| !key.starts_with(prefix));
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache_with_clock() -> (ResponseCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (ResponseCache::new(clock.clone()), clock)
    }

    #[test]
    fn test_hit_within_ttl() {
        let (cache, clock) = cache_with_clock();
        cache.insert("tickets_page=1", json!({"data": []}));
        clock.advance(Duration::from_secs(89));
        assert_eq!(cache.get("tickets_page=1", Duration::from_secs(90)), Some(json!({"data": []})));
    }

    #[test]
    fn test_expires_at_ttl() {
        let (cache, clock) = cache_with_clock();
        cache.insert("employees", json!([1, 2]));
        clock.advance(Duration::from_secs(1800));
        assert_eq!(cache.get("employees", Duration::from_secs(1800)), None);
    }

    #[test]
    fn test_ttl_is_chosen_per_lookup() {
        let (cache, clock) = cache_with_clock();
        cache.insert("k", json!(1));
        clock.advance(Duration::from_secs(120));
        assert_eq!(cache.get("k", Duration::from_secs(90)), None);
        assert_eq!(cache.get("k", Duration::from_secs(180)), Some(json!(1)));
    }

    #[test]
    fn test_insert_refreshes_timestamp() {
        let (cache, clock) = cache_with_clock();
        cache.insert("k", json!("old"));
        clock.advance(Duration::from_secs(60));
        cache.insert("k", json!("new"));
        clock.advance(Duration::from_secs(60));
        assert_eq!(cache.get("k", Duration::from_secs(90)), Some(json!("new")));
    }

    #[test]
    fn test_invalidate_prefix() {
        let (cache, _clock) = cache_with_clock();
        cache.insert("tickets_page=1", json!(1));
        cache.insert("tickets_page=2", json!(2));
        cache.insert("employees", json!(3));
        cache.invalidate_prefix("tickets_");
        assert_eq!(cache.len(), 1);
        cache.invalidate("employees");
        assert!(cache.is_empty());
    }
}
