//! Periodic expiry sweep.
//!
//! # Responsibilities
//! - Bound memory held by expired-but-unread entries
//! - Exit promptly on the shutdown signal

use crate::cache::store::TieredCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

/// Timer task that removes expired entries even when nothing reads them.
pub struct Sweeper {
    cache: Arc<TieredCache>,
    interval: Duration,
}

impl Sweeper {
    pub fn new(cache: Arc<TieredCache>, interval: Duration) -> Self {
        Self { cache, interval }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Cache sweeper starting");

        let mut ticker = time::interval(self.interval);
        // The first tick fires immediately; skip it so a fresh store isn't swept at t=0.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.cache.sweep_expired();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Cache sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::SetOptions;
    use crate::config::schema::CacheConfig;
    use serde_json::Value;

    #[tokio::test]
    async fn test_sweeper_removes_expired_and_stops() {
        let cache = Arc::new(TieredCache::new(&CacheConfig::default()));
        cache.set(
            "stale",
            Value::from(1),
            SetOptions::with_ttl(Duration::from_millis(10)),
        );

        let (tx, rx) = broadcast::channel(1);
        let sweeper = Sweeper::new(cache.clone(), Duration::from_millis(25));
        let handle = tokio::spawn(sweeper.run(rx));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.entry_count(), 0);

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
