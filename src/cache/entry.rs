//! Cache entry and per-entry metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Entry priority. Recorded per entry and surfaced in stats/inspection;
/// callers use it to mark which entries matter when debugging pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Per-set options. Unset fields fall back to the store defaults.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub ttl: Option<Duration>,
    pub tags: Vec<String>,
    pub priority: Option<Priority>,
}

impl SetOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Default::default()
        }
    }

    pub fn tagged(tags: Vec<String>) -> Self {
        Self {
            tags,
            ..Default::default()
        }
    }
}

/// A single cached value with its bookkeeping.
///
/// Owned exclusively by the store; callers only ever see cloned values.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub created_at: Instant,
    pub ttl: Duration,
    pub tags: HashSet<String>,
    pub priority: Priority,
    pub approx_size: usize,
    pub last_accessed: Instant,
    pub hit_count: u64,
}

impl CacheEntry {
    pub fn new(
        value: Value,
        ttl: Duration,
        tags: HashSet<String>,
        priority: Priority,
        approx_size: usize,
    ) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            ttl,
            tags,
            priority,
            approx_size,
            last_accessed: now,
            hit_count: 0,
        }
    }

    /// Logically absent once past its TTL, even before the sweeper runs.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }

    /// Record a hit.
    pub fn touch(&mut self, now: Instant) {
        self.last_accessed = now;
        self.hit_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary() {
        let entry = CacheEntry::new(
            Value::from(1),
            Duration::from_millis(100),
            HashSet::new(),
            Priority::Medium,
            8,
        );

        assert!(!entry.is_expired(entry.created_at + Duration::from_millis(50)));
        assert!(entry.is_expired(entry.created_at + Duration::from_millis(150)));
    }

    #[test]
    fn test_touch_updates_bookkeeping() {
        let mut entry = CacheEntry::new(
            Value::from("x"),
            Duration::from_secs(60),
            HashSet::new(),
            Priority::Low,
            8,
        );
        let later = entry.created_at + Duration::from_millis(10);
        entry.touch(later);

        assert_eq!(entry.hit_count, 1);
        assert_eq!(entry.last_accessed, later);
    }
}
