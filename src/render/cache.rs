//! Time-bounded result cache.
//!
//! [`TtlCache`] maps keys to values stamped with the time they were stored.
//! An entry is fresh while its age is below the TTL. Expiry is lazy: a stale
//! entry is only noticed, and evicted, when its own key is looked up. There
//! is no background sweep and no capacity bound.
//!
//! # Single-flight
//!
//! [`TtlCache::get_or_try_insert_with`] guarantees that at most one
//! initializer runs per key at a time. Concurrent callers for the same key
//! queue on a per-key gate; once the first caller has stored a value the
//! others find it fresh and return it without running their own
//! initializer. A failed initializer stores nothing, and the next queued
//! caller tries again.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{Mutex, RwLock};

/// Default entry lifetime: 1 hour.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

// =============================================================================
// Clock
// =============================================================================

/// Source of wall-clock time for stamping and ageing entries.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock that only moves when told to, with millisecond resolution.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// Start the clock at `start`.
    pub fn new(start: SystemTime) -> Self {
        Self {
            millis: AtomicU64::new(system_time_millis(start)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, to: SystemTime) {
        self.millis.store(system_time_millis(to), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

/// Milliseconds since the Unix epoch; times before the epoch map to 0.
pub fn system_time_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// =============================================================================
// Cache Entry
// =============================================================================

/// A cached value and the time it was stored.
#[derive(Debug)]
pub struct CacheEntry<V> {
    value: V,
    stored_at: SystemTime,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, stored_at: SystemTime) -> Self {
        Self { value, stored_at }
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    /// When this entry was created.
    pub fn stored_at(&self) -> SystemTime {
        self.stored_at
    }

    /// `stored_at` in milliseconds since the Unix epoch.
    pub fn stored_at_millis(&self) -> u64 {
        system_time_millis(self.stored_at)
    }

    /// Time elapsed since `stored_at`, or zero if `now` is earlier.
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.stored_at).unwrap_or(Duration::ZERO)
    }

    /// Whether the entry is still fresh at `now`.
    pub fn is_fresh(&self, ttl: Duration, now: SystemTime) -> bool {
        self.age(now) < ttl
    }
}

/// Result of [`TtlCache::get_or_try_insert_with`].
#[derive(Debug)]
pub struct Lookup<V> {
    /// The fresh entry for the key
    pub entry: Arc<CacheEntry<V>>,

    /// Whether the entry existed before this call
    pub hit: bool,
}

// =============================================================================
// TTL Cache
// =============================================================================

/// Generic TTL cache with lazy expiry and per-key single-flight population.
///
/// # Thread Safety
///
/// The cache is thread-safe and can be shared across async tasks via `Arc`.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use imgrender::render::TtlCache;
///
/// #[tokio::main]
/// async fn main() {
///     let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(60));
///
///     cache.insert("answer", 42).await;
///     let entry = cache.get(&"answer").await.unwrap();
///     assert_eq!(*entry.value(), 42);
/// }
/// ```
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, Arc<CacheEntry<V>>>>,

    /// Per-key gates serialising initializers
    gates: Mutex<HashMap<K, Arc<Mutex<()>>>>,

    ttl: Duration,

    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Create a cache using the system clock.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Create a cache with an explicit clock.
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Entry lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current time according to the cache's clock.
    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    /// Look up a fresh entry, evicting it if it has gone stale.
    pub async fn get(&self, key: &K) -> Option<Arc<CacheEntry<V>>> {
        self.get_at(key, self.clock.now()).await
    }

    /// [`get`](Self::get) evaluated at an explicit time.
    pub async fn get_at(&self, key: &K, now: SystemTime) -> Option<Arc<CacheEntry<V>>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if entry.is_fresh(self.ttl, now) => return Some(Arc::clone(entry)),
                Some(_) => {}
            }
        }

        // Stale: re-check under the write lock, since a concurrent insert may
        // have replaced the entry in between.
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.is_fresh(self.ttl, now) => Some(Arc::clone(entry)),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert or replace the entry for `key`, stamped with the current time.
    pub async fn insert(&self, key: K, value: V) -> Arc<CacheEntry<V>> {
        self.insert_at(key, value, self.clock.now()).await
    }

    /// [`insert`](Self::insert) stamped with an explicit time.
    pub async fn insert_at(&self, key: K, value: V, now: SystemTime) -> Arc<CacheEntry<V>> {
        let entry = Arc::new(CacheEntry::new(value, now));
        let mut entries = self.entries.write().await;
        entries.insert(key, Arc::clone(&entry));
        entry
    }

    /// Return the fresh entry for `key`, running `init` to create it if needed.
    ///
    /// At most one `init` runs per key at a time. Errors from `init` are
    /// returned to this caller and nothing is cached.
    pub async fn get_or_try_insert_with<F, Fut, E>(
        &self,
        key: K,
        init: F,
    ) -> Result<Lookup<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        // Fast path
        if let Some(entry) = self.get(&key).await {
            return Ok(Lookup { entry, hit: true });
        }

        let gate = {
            let mut gates = self.gates.lock().await;
            Arc::clone(gates.entry(key.clone()).or_default())
        };

        let result = {
            let _guard = gate.lock().await;

            // Whoever held the gate before us may have filled the entry
            match self.get(&key).await {
                Some(entry) => Ok(Lookup { entry, hit: true }),
                None => match init().await {
                    Ok(value) => {
                        let entry = self.insert(key.clone(), value).await;
                        Ok(Lookup { entry, hit: false })
                    }
                    Err(e) => Err(e),
                },
            }
        };

        self.release_gate(&key, gate).await;
        result
    }

    /// Drop the gate for `key` unless other callers still hold it.
    async fn release_gate(&self, key: &K, gate: Arc<Mutex<()>>) {
        let mut gates = self.gates.lock().await;
        drop(gate);
        // Clones are only taken under the map lock, so a lone map reference
        // means nobody is queued
        if gates.get(key).is_some_and(|g| Arc::strong_count(g) == 1) {
            gates.remove(key);
        }
    }

    /// Remove an entry regardless of freshness.
    pub async fn remove(&self, key: &K) -> Option<Arc<CacheEntry<V>>> {
        self.entries.write().await.remove(key)
    }

    /// Remove all entries.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of stored entries, including stale ones not yet looked up.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Number of keys with an initializer running or queued.
    pub async fn in_flight(&self) -> usize {
        self.gates.lock().await.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
