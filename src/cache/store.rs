//! Generic key/value store with per-entry expiry.
//!
//! [`CacheStore`] wraps a `moka::sync::Cache` whose expiry policy is
//! decided per entry: each write carries its own time-to-live (or none),
//! falling back to the store's default TTL for plain [`CacheStore::write`].
//!
//! Each entry also records its deadline. moka's own timer only fires on a
//! coarse tick, so the deadline is what decides freshness for
//! [`CacheStore::delete`] and what [`CacheStore::cleanup`] evicts by.

use std::time::{Duration, Instant};

use moka::Expiry;
use moka::sync::Cache;
use tracing::{trace, warn};

/// Default maximum number of entries held by a store.
pub const DEFAULT_MAX_ENTRIES: u64 = 100_000;

/// A stored value together with the TTL it was written with.
#[derive(Clone, Debug)]
struct Entry<V> {
    value: V,
    ttl: Option<Duration>,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn new(value: V, ttl: Option<Duration>) -> Self {
        // A TTL too large to represent never expires.
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        Self {
            value,
            ttl: expires_at.and(ttl),
            expires_at,
        }
    }

    fn until(value: V, deadline: Instant) -> Self {
        Self {
            value,
            ttl: Some(deadline.saturating_duration_since(Instant::now())),
            expires_at: Some(deadline),
        }
    }

    fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Expiry policy reading the TTL recorded on each entry.
///
/// Overwrites restart the clock with the new entry's TTL rather than keeping
/// the previous deadline.
struct PerEntryExpiry;

impl<V> Expiry<String, Entry<V>> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Entry<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// Thread-safe in-memory store with per-entry expiry.
///
/// All operations are atomic with respect to each other and none of them
/// fail: a missing or expired key simply reads as `None`.
///
/// ```rust
/// # use fanart::cache::CacheStore;
/// # use std::time::Duration;
/// let store: CacheStore<String> = CacheStore::new(Some(Duration::from_secs(60)));
/// store.write("greeting", "hello".to_string());
/// assert_eq!(store.read("greeting").as_deref(), Some("hello"));
/// assert!(store.delete("greeting"));
/// assert!(store.read("greeting").is_none());
/// ```
pub struct CacheStore<V> {
    entries: Cache<String, Entry<V>>,
    default_ttl: Option<Duration>,
    max_entries: u64,
}

impl<V> CacheStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a store with the given default TTL and the default capacity.
    ///
    /// A `None` default means plain writes never expire.
    pub fn new(default_ttl: Option<Duration>) -> Self {
        Self::with_max_entries(default_ttl, DEFAULT_MAX_ENTRIES)
    }

    /// Create a store with a custom maximum capacity.
    ///
    /// Past capacity moka's admission policy may reject or evict entries, so
    /// size it above the largest set of entries that must stay resident
    /// together.
    pub fn with_max_entries(default_ttl: Option<Duration>, max_entries: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryExpiry)
            .support_invalidation_closures()
            .build();
        Self {
            entries,
            default_ttl,
            max_entries,
        }
    }

    /// The TTL applied by [`write`](Self::write).
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    pub fn max_entries(&self) -> u64 {
        self.max_entries
    }

    /// Store a value under the default TTL.
    pub fn write(&self, key: impl Into<String>, value: V) {
        self.write_with_ttl(key, value, self.default_ttl);
    }

    /// Store a value with an explicit TTL; `None` never expires.
    pub fn write_with_ttl(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        trace!(key = %key, ttl_ms = ttl.map(|t| t.as_millis() as u64), "cache write");
        self.entries.insert(key, Entry::new(value, ttl));
    }

    /// Store a value that expires at a fixed instant.
    pub fn write_until(&self, key: impl Into<String>, value: V, deadline: Instant) {
        let key = key.into();
        trace!(key = %key, "cache write with deadline");
        self.entries.insert(key, Entry::until(value, deadline));
    }

    /// Fetch a fresh value.
    ///
    /// Returns `None` if the key is absent or its entry has expired.
    pub fn read(&self, key: &str) -> Option<V> {
        let value = self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired_at(Instant::now()))
            .map(|entry| entry.value);
        trace!(key, hit = value.is_some(), "cache read");
        value
    }

    /// Whether a fresh entry exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.read(key).is_some()
    }

    /// Deadline of a fresh entry. `None` if the key is absent or never
    /// expires.
    pub fn expires_at(&self, key: &str) -> Option<Instant> {
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired_at(Instant::now()))
            .and_then(|entry| entry.expires_at)
    }

    /// Remove an entry. Returns `true` if a fresh entry was removed.
    ///
    /// An expired entry not yet evicted is removed too, but reported as
    /// absent.
    pub fn delete(&self, key: &str) -> bool {
        self.entries
            .remove(key)
            .is_some_and(|entry| !entry.is_expired_at(Instant::now()))
    }

    /// Remove every entry unconditionally.
    pub fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
    }

    /// Evict every entry whose deadline has passed.
    pub fn cleanup(&self) {
        let now = Instant::now();
        if let Err(e) = self
            .entries
            .invalidate_entries_if(move |_, entry| entry.is_expired_at(now))
        {
            warn!(error = %e, "cache cleanup predicate rejected");
        }
        self.entries.run_pending_tasks();
    }

    /// Approximate number of entries, including ones not yet evicted.
    pub fn len(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
