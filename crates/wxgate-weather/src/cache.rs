//! Time-bounded response cache.
//!
//! `CacheStore` is the seam the service talks to; `MemoryCache` is the
//! in-process implementation. Expiry is measured on `tokio::time::Instant`
//! so paused-clock tests can move time forward.

use std::future::Future;
use std::time::Duration;

use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use moka::Expiry;
use tokio::time::Instant;

use crate::types::{CachedValue, Cacheable, Coordinates};

/// Lifetime of current-conditions and forecast entries.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Longest lifetime an entry can get; larger TTLs are clamped to it.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 3600);

/// Kinds of coordinate-keyed entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Current,
    Forecast,
}

impl CacheKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Forecast => "forecast",
        }
    }

    /// Key built from the coordinates alone, e.g. `current:10.0000:20.0000`.
    pub fn key(self, coords: &Coordinates) -> String {
        format!("{}:{}", self.prefix(), coords.cache_fragment())
    }
}

/// A stored value with its lifetime.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    value: CachedValue,
    ttl: Duration,
    created_at: Instant,
    expires_at: Instant,
}

impl CacheEntry {
    /// `ttl` is clamped to `MAX_TTL`.
    pub fn new(value: CachedValue, ttl: Duration) -> Self {
        let ttl = ttl.min(MAX_TTL);
        let created_at = Instant::now();
        Self {
            value,
            ttl,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    pub fn value(&self) -> &CachedValue {
        &self.value
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Visible only strictly before the expiration instant.
    pub fn is_live_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Key-value store with per-entry expiration.
///
/// Each call is atomic on its own; callers never hold a lock across calls.
pub trait CacheStore: Send + Sync {
    /// Live value for `key`. Expired entries read as absent.
    fn get(&self, key: &str) -> Option<CachedValue>;

    /// Store `value`, replacing any previous entry, until `now + ttl`.
    fn insert(&self, key: &str, value: CachedValue, ttl: Duration);

    /// Returns true if an entry (live or not) was removed.
    fn remove(&self, key: &str) -> bool;

    /// Number of live entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries, returning how many were evicted.
    fn purge_expired(&self) -> usize;
}

/// Return the live entry for `key`, or run `compute` once and store its result.
///
/// A failed compute writes nothing and its error is returned unchanged.
/// Concurrent misses on the same key each run their own compute and the last
/// insert wins.
pub async fn get_or_compute<T, E, F, Fut>(
    store: &dyn CacheStore,
    key: &str,
    ttl: Duration,
    compute: F,
) -> Result<T, E>
where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if let Some(cached) = store.get(key) {
        match T::from_cached(cached) {
            Some(value) => {
                tracing::debug!(key, "cache hit");
                return Ok(value);
            }
            None => tracing::warn!(key, "cache entry holds a different kind, recomputing"),
        }
    } else {
        tracing::debug!(key, "cache miss");
    }

    let value = compute().await?;
    store.insert(key, value.clone().into_cached(), ttl);
    Ok(value)
}

/// Lets moka reclaim entries on its own clock once their TTL has passed.
struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &CacheEntry,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &CacheEntry,
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-memory `CacheStore` backed by `moka`.
///
/// Visibility is decided on `tokio::time::Instant`; moka's own expiry only
/// reclaims memory. With a capacity bound, the least recently used entry is
/// evicted when a new key would exceed it.
pub struct MemoryCache {
    entries: Cache<String, CacheEntry>,
    max_entries: usize,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.entries.entry_count())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    /// Unbounded cache; TTL alone limits growth.
    pub fn new() -> Self {
        Self {
            entries: Cache::builder().expire_after(EntryExpiry).build(),
            max_entries: 0,
        }
    }

    /// Cache holding at most `max_entries` entries (0 = unbounded).
    pub fn with_max_entries(max_entries: usize) -> Self {
        if max_entries == 0 {
            return Self::new();
        }
        Self {
            entries: Cache::builder()
                .max_capacity(max_entries as u64)
                .eviction_policy(EvictionPolicy::lru())
                .expire_after(EntryExpiry)
                .build(),
            max_entries,
        }
    }

    /// Live entry for `key`, including its timestamps.
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        let now = Instant::now();
        self.entries.get(key).filter(|entry| entry.is_live_at(now))
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Option<CachedValue> {
        self.entry(key).map(|entry| entry.value)
    }

    fn insert(&self, key: &str, value: CachedValue, ttl: Duration) {
        self.entries.insert(key.to_string(), CacheEntry::new(value, ttl));
        if self.max_entries > 0 {
            // Apply capacity eviction now so `len` never overshoots the bound
            self.entries.run_pending_tasks();
        }
    }

    fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_live_at(now))
            .count()
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_live_at(now))
            .map(|(key, _)| key)
            .collect();
        for key in &expired {
            self.entries.invalidate(key.as_str());
        }
        self.entries.run_pending_tasks();
        expired.len()
    }
}
