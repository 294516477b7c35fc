//! In-process TTL cache
//!
//! Covers the handful of key/value operations the service needs from a cache:
//! plain values with an optional expiry, integer counters for rate limiting,
//! and remaining-lifetime lookups for cooldowns. Expired entries behave
//! exactly like missing ones and are dropped lazily on access or in bulk by
//! [`TtlCache::purge_expired`].

use std::time::{Duration, Instant};

use dashmap::DashMap;
use log::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }
}

/// Concurrent key/value store with per-key expiry
#[derive(Debug, Default)]
pub struct TtlCache {
    entries: DashMap<String, CacheEntry>,
}

impl TtlCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Get a live value
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let value = self.entries.get(key).and_then(|entry| {
            if entry.is_expired(now) {
                None
            } else {
                Some(entry.value.clone())
            }
        });

        if value.is_none() {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        value
    }

    /// Store a value, replacing any previous value and expiry
    pub fn set(&self, key: &str, value: impl Into<String>, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.into(),
                expires_at,
            },
        );
    }

    /// Increment an integer counter and return the new value.
    ///
    /// Missing, expired or non-numeric entries count from zero. An existing
    /// expiry is kept.
    pub fn incr(&self, key: &str) -> i64 {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry {
                value: "0".to_string(),
                expires_at: None,
            });

        if entry.is_expired(now) {
            entry.value = "0".to_string();
            entry.expires_at = None;
        }

        let next = entry.value.parse::<i64>().unwrap_or(0).saturating_add(1);
        entry.value = next.to_string();
        next
    }

    /// Set the expiry of a live key. Returns false when the key is absent.
    pub fn expire(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + ttl);
                true
            }
            _ => false,
        }
    }

    /// Remaining lifetime of a live key that has an expiry
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries.get(key).and_then(|entry| match entry.expires_at {
            Some(deadline) if deadline > now => Some(deadline - now),
            _ => None,
        })
    }

    /// Delete a key. Returns true when a live value was removed.
    pub fn del(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .remove(key)
            .map(|(_, entry)| !entry.is_expired(now))
            .unwrap_or(false)
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            debug!("Purged {} expired cache entries", removed);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_set_get_del() {
        let cache = TtlCache::new();
        assert_eq!(cache.get("missing"), None);

        cache.set("otp:a@b.c", "123456", None);
        assert_eq!(cache.get("otp:a@b.c").as_deref(), Some("123456"));
        assert_eq!(cache.ttl("otp:a@b.c"), None);

        assert!(cache.del("otp:a@b.c"));
        assert!(!cache.del("otp:a@b.c"));
        assert_eq!(cache.get("otp:a@b.c"), None);
    }

    #[test]
    fn test_values_expire() {
        let cache = TtlCache::new();
        cache.set("short", "1", Some(Duration::from_millis(20)));
        assert!(cache.ttl("short").is_some());

        sleep(Duration::from_millis(40));
        assert_eq!(cache.get("short"), None);
        assert_eq!(cache.ttl("short"), None);
        assert!(!cache.expire("short", Duration::from_secs(5)));
    }

    #[test]
    fn test_incr_counts_and_keeps_expiry() {
        let cache = TtlCache::new();
        assert_eq!(cache.incr("auth:x"), 1);
        assert!(cache.expire("auth:x", Duration::from_secs(60)));
        assert_eq!(cache.incr("auth:x"), 2);

        let remaining = cache.ttl("auth:x").expect("expiry kept after incr");
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(50));
    }

    #[test]
    fn test_incr_restarts_after_expiry() {
        let cache = TtlCache::new();
        cache.incr("counter");
        cache.incr("counter");
        cache.expire("counter", Duration::from_millis(20));

        sleep(Duration::from_millis(40));
        assert_eq!(cache.incr("counter"), 1);
        assert_eq!(cache.ttl("counter"), None);
    }

    #[test]
    fn test_purge_expired() {
        let cache = TtlCache::new();
        cache.set("a", "1", Some(Duration::from_millis(10)));
        cache.set("b", "2", None);

        sleep(Duration::from_millis(30));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b").as_deref(), Some("2"));
    }
}
