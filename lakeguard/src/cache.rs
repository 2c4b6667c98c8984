//! Bounded, time-limited memo of prior validation outcomes.
//!
//! The cache enforces single-flight semantics per key: the first requester
//! for a missing or expired key claims it, concurrent requesters for the same
//! key await that computation's broadcast result instead of starting their
//! own. Distinct keys compute independently.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::core::run::ValidationRun;
use crate::error::{GuardError, Result};

/// Result payload broadcast to single-flight followers. Errors cross the
/// channel as strings because `GuardError` is not `Clone`.
type FlightOutcome = std::result::Result<ValidationRun, String>;

/// Configuration for the result cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultCacheConfig {
    /// Maximum number of entries kept
    pub capacity: usize,
    /// Time-to-live for entries
    pub ttl: Duration,
}

impl Default for ResultCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// A cached validation run with its expiry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub run: ValidationRun,
    pub created_at: Instant,
    pub expires_at: Instant,
}

/// Counters describing cache behavior, exported as metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Requests that waited on another request's in-flight computation
    pub coalesced: u64,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// LRU order; front is the least recently used key
    order: VecDeque<String>,
    in_flight: HashMap<String, broadcast::Sender<FlightOutcome>>,
    stats: CacheStats,
}

impl CacheInner {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.to_string());
    }

    fn get_fresh(&mut self, key: &str, now: Instant) -> Option<ValidationRun> {
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => {
                let run = entry.run.clone();
                self.touch(key);
                self.stats.hits += 1;
                Some(run)
            }
            Some(_) => {
                // Expired: drop it so the key can be reclaimed
                self.entries.remove(key);
                self.order.retain(|k| k != key);
                self.stats.misses += 1;
                None
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    fn insert(&mut self, key: String, run: ValidationRun, ttl: Duration, capacity: usize) {
        let now = Instant::now();
        while !self.entries.contains_key(&key) && self.entries.len() >= capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                    self.stats.evictions += 1;
                }
                None => break,
            }
        }
        self.entries.insert(
            key.clone(),
            CacheEntry {
                run,
                created_at: now,
                expires_at: now + ttl,
            },
        );
        self.touch(&key);
    }
}

/// Bounded associative store of validation runs with TTL, LRU eviction, and
/// per-key single-flight computation.
///
/// The inner map is under a synchronous lock, never held across an await;
/// that keeps cancellation cleanup possible from a `Drop` impl.
pub struct ResultCache {
    config: ResultCacheConfig,
    inner: Mutex<CacheInner>,
}

/// Releases a claimed in-flight key if the claiming future is dropped before
/// it publishes. Dropping the sender wakes waiters with a receive error, so
/// a cancelled computation cannot wedge the key.
struct FlightGuard<'a> {
    cache: &'a ResultCache,
    key: &'a str,
    published: bool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.published {
            self.cache.lock_inner().in_flight.remove(self.key);
        }
    }
}

impl ResultCache {
    /// Creates a cache with default capacity and TTL.
    pub fn new() -> Self {
        Self::with_config(ResultCacheConfig::default())
    }

    /// Creates a cache with the given configuration.
    pub fn with_config(config: ResultCacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                in_flight: HashMap::new(),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Locks the map, recovering from a poisoned lock; every mutation under
    /// it leaves the map in a consistent state.
    fn lock_inner(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up a fresh entry by key.
    pub async fn get(&self, key: &str) -> Option<ValidationRun> {
        self.lock_inner().get_fresh(key, Instant::now())
    }

    /// Stores a run under the given key, evicting the least-recently-used
    /// entry on overflow.
    pub async fn put(&self, key: impl Into<String>, run: ValidationRun) {
        self.lock_inner()
            .insert(key.into(), run, self.config.ttl, self.config.capacity);
    }

    /// Returns the number of entries currently stored.
    pub async fn len(&self) -> usize {
        self.lock_inner().entries.len()
    }

    /// Returns true if the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.lock_inner().entries.is_empty()
    }

    /// Returns true if a fresh entry exists for the key without touching LRU
    /// order.
    pub async fn contains(&self, key: &str) -> bool {
        self.lock_inner()
            .entries
            .get(key)
            .map(|e| e.expires_at > Instant::now())
            .unwrap_or(false)
    }

    /// Returns a snapshot of the cache counters.
    pub async fn stats(&self) -> CacheStats {
        self.lock_inner().stats
    }

    /// Returns the cached run for `key`, or runs `compute` to produce it.
    ///
    /// At most one computation per key is in flight: concurrent callers for
    /// the same key await the first caller's result. A failed computation is
    /// propagated to the claiming caller as-is and to waiters as a
    /// `Cache` error carrying the message.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F) -> Result<ValidationRun>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ValidationRun>>,
    {
        let waiter = {
            let mut inner = self.lock_inner();
            if let Some(run) = inner.get_fresh(key, Instant::now()) {
                debug!(cache.key = %key, "Cache hit");
                return Ok(run);
            }
            let subscription = inner.in_flight.get(key).map(|tx| tx.subscribe());
            match subscription {
                Some(rx) => {
                    inner.stats.coalesced += 1;
                    Some(rx)
                }
                None => {
                    let (tx, _rx) = broadcast::channel(1);
                    inner.in_flight.insert(key.to_string(), tx);
                    None
                }
            }
        };

        if let Some(mut rx) = waiter {
            debug!(cache.key = %key, "Awaiting in-flight computation");
            return match rx.recv().await {
                Ok(Ok(run)) => Ok(run),
                Ok(Err(message)) => Err(GuardError::Cache(format!(
                    "in-flight computation for key failed: {message}"
                ))),
                Err(_) => Err(GuardError::Cache(
                    "in-flight computation abandoned".to_string(),
                )),
            };
        }

        // This caller claimed the key; run the computation and publish. The
        // guard releases the claim if this future is dropped mid-computation.
        let mut guard = FlightGuard {
            cache: self,
            key,
            published: false,
        };
        let result = compute().await;

        let mut inner = self.lock_inner();
        let tx = inner.in_flight.remove(key);
        guard.published = true;
        match &result {
            Ok(run) => {
                inner.insert(
                    key.to_string(),
                    run.clone(),
                    self.config.ttl,
                    self.config.capacity,
                );
                if let Some(tx) = tx {
                    let _ = tx.send(Ok(run.clone()));
                }
            }
            Err(err) => {
                warn!(cache.key = %key, error = %err, "Computation failed, nothing cached");
                if let Some(tx) = tx {
                    let _ = tx.send(Err(err.to_string()));
                }
            }
        }
        result
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}
