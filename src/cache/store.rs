//! Tiered key/value store with TTL, tags, and pluggable eviction.

use crate::cache::entry::{CacheEntry, Priority, SetOptions};
use crate::cache::singleflight::{FlightRole, FlightTable};
use crate::config::schema::CacheConfig;
use crate::errors::{DependencyError, ErrorKind};
use crate::observability::metrics;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Rule for choosing the victim when the store exceeds its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Oldest `last_accessed` goes first.
    Lru,
    /// Lowest `hit_count` goes first, ties broken by oldest `last_accessed`.
    Lfu,
    /// Oldest `created_at` goes first, regardless of access pattern.
    Fifo,
}

impl EvictionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Lfu => "lfu",
            EvictionPolicy::Fifo => "fifo",
        }
    }
}

/// Point-in-time counters for the observability summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub evictions: u64,
    pub expired: u64,
}

/// Concurrent cache store.
///
/// Reads and writes hit sharded map buckets; only eviction victim selection is
/// serialized, so traffic on unrelated keys never queues.
pub struct TieredCache {
    entries: DashMap<String, CacheEntry>,
    flights: FlightTable,
    policy: EvictionPolicy,
    max_entries: usize,
    max_bytes: usize,
    default_ttl: Duration,
    default_priority: Priority,
    bytes: AtomicUsize,
    evict_lock: Mutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired: AtomicU64,
}

impl TieredCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            flights: FlightTable::new(),
            policy: config.eviction_policy,
            max_entries: config.max_entries,
            max_bytes: config.max_bytes,
            default_ttl: Duration::from_millis(config.default_ttl_ms),
            default_priority: config.default_priority,
            bytes: AtomicUsize::new(0),
            evict_lock: Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    /// Look up a key. Expired entries are removed and reported as misses.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();

        if let Some(mut entry) = self.entries.get_mut(key) {
            if !entry.is_expired(now) {
                entry.touch(now);
                let value = entry.value.clone();
                drop(entry);
                self.hits.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_hit();
                return Some(value);
            }
        }

        // Lazy expiry: drop the stale entry if it is still the one we saw.
        let now = Instant::now();
        if let Some((_, old)) = self.entries.remove_if(key, |_, v| v.is_expired(now)) {
            self.bytes.fetch_sub(old.approx_size, Ordering::Relaxed);
            self.expired.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_miss();
        None
    }

    /// Insert a value.
    ///
    /// Evicts until the new entry fits. A value that alone exceeds the byte
    /// budget is dropped without error.
    pub fn set(&self, key: &str, value: Value, opts: SetOptions) {
        let approx = serde_json::to_vec(&value).map(|b| b.len()).unwrap_or(0);
        if approx > self.max_bytes {
            metrics::record_cache_rejected_entry();
            tracing::debug!(key, size = approx, budget = self.max_bytes, "Entry exceeds byte budget, not cached");
            return;
        }

        self.make_room(approx);

        let entry = CacheEntry::new(
            value,
            opts.ttl.unwrap_or(self.default_ttl),
            opts.tags.into_iter().collect(),
            opts.priority.unwrap_or(self.default_priority),
            approx,
        );
        if let Some(old) = self.entries.insert(key.to_string(), entry) {
            self.bytes.fetch_sub(old.approx_size, Ordering::Relaxed);
        }
        self.bytes.fetch_add(approx, Ordering::Relaxed);

        // Concurrent writers may each have made room for only themselves.
        self.enforce_budget();
        metrics::record_cache_size(self.entries.len(), self.bytes.load(Ordering::Relaxed));
    }

    /// Remove a key. Returns whether it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some((_, old)) => {
                self.bytes.fetch_sub(old.approx_size, Ordering::Relaxed);
                metrics::record_cache_size(self.entries.len(), self.bytes.load(Ordering::Relaxed));
                true
            }
            None => false,
        }
    }

    /// Remove every entry carrying `tag`; all others stay untouched.
    ///
    /// This is the primary invalidation primitive: tag entries with a resource
    /// id, then drop them all after a mutation of that resource.
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|r| r.value().tags.contains(tag))
            .map(|r| r.key().clone())
            .collect();

        let mut removed = 0;
        for key in keys {
            if self.invalidate(&key) {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(tag, removed, "Invalidated entries by tag");
        }
        removed
    }

    /// Fetch `key`, computing it at most once across all concurrent callers.
    ///
    /// Late arrivals for a key with an in-flight computation suspend until the
    /// leader finishes and then share its result, value or error.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        opts: SetOptions,
        compute: F,
    ) -> Result<Value, DependencyError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, DependencyError>>,
    {
        let mut compute = Some(compute);
        loop {
            if let Some(value) = self.get(key) {
                return Ok(value);
            }

            match self.flights.join(key) {
                FlightRole::Leader(guard) => {
                    let compute = match compute.take() {
                        Some(f) => f,
                        // A waiter never consumes the closure, and a leader
                        // returns below, so re-leading cannot happen.
                        None => {
                            return Err(DependencyError::new(
                                ErrorKind::Internal,
                                "compute closure consumed twice",
                            ))
                        }
                    };
                    let result = compute().await;
                    if let Ok(value) = &result {
                        self.set(key, value.clone(), opts);
                    }
                    guard.publish(result.clone());
                    return result;
                }
                FlightRole::Waiter(mut rx) => match rx.recv().await {
                    Ok(result) => return result,
                    // Leader unwound without publishing; take over.
                    Err(_) => continue,
                },
            }
        }
    }

    /// Remove every expired entry. Called by the sweeper timer.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|r| r.value().is_expired(now))
            .map(|r| r.key().clone())
            .collect();

        let mut removed = 0;
        for key in stale {
            if let Some((_, old)) = self.entries.remove_if(&key, |_, v| v.is_expired(now)) {
                self.bytes.fetch_sub(old.approx_size, Ordering::Relaxed);
                self.expired.fetch_add(1, Ordering::Relaxed);
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(removed, "Swept expired cache entries");
            metrics::record_cache_size(self.entries.len(), self.bytes.load(Ordering::Relaxed));
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            entries: self.entries.len(),
            bytes: self.bytes.load(Ordering::Relaxed),
            hits,
            misses,
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
            evictions: self.evictions.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn byte_total(&self) -> usize {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Evict until an incoming entry of `incoming` bytes fits.
    fn make_room(&self, incoming: usize) {
        let guard = self.evict_lock.lock().unwrap_or_else(|e| e.into_inner());
        while self.entries.len() + 1 > self.max_entries
            || self.bytes.load(Ordering::Relaxed) + incoming > self.max_bytes
        {
            if !self.evict_one() {
                break;
            }
        }
        drop(guard);
    }

    /// Evict until the store is back within its budgets.
    fn enforce_budget(&self) {
        let guard = self.evict_lock.lock().unwrap_or_else(|e| e.into_inner());
        while self.entries.len() > self.max_entries
            || self.bytes.load(Ordering::Relaxed) > self.max_bytes
        {
            if !self.evict_one() {
                break;
            }
        }
        drop(guard);
    }

    fn evict_one(&self) -> bool {
        let victim = self.select_victim();
        match victim {
            Some(key) => {
                if let Some((_, old)) = self.entries.remove(&key) {
                    self.bytes.fetch_sub(old.approx_size, Ordering::Relaxed);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    metrics::record_cache_eviction(self.policy.as_str());
                    tracing::trace!(key, policy = self.policy.as_str(), "Evicted cache entry");
                }
                true
            }
            None => false,
        }
    }

    /// Pick the victim key under the current policy.
    ///
    /// Scores collapse to `(count, instant)` so one scan serves all policies.
    /// The iteration finishes before removal; DashMap shard locks must not be
    /// held across a `remove` on the same shard.
    fn select_victim(&self) -> Option<String> {
        let mut victim: Option<(String, (u64, Instant))> = None;
        for r in self.entries.iter() {
            let entry = r.value();
            let score = match self.policy {
                EvictionPolicy::Lru => (0, entry.last_accessed),
                EvictionPolicy::Lfu => (entry.hit_count, entry.last_accessed),
                EvictionPolicy::Fifo => (0, entry.created_at),
            };
            let better = match &victim {
                Some((_, best)) => score < *best,
                None => true,
            };
            if better {
                victim = Some((r.key().clone(), score));
            }
        }
        victim.map(|(key, _)| key)
    }
}
