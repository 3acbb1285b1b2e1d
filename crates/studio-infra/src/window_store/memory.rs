//! In-memory sliding-window log - used for single-node deployments.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use studio_core::ports::{WindowSnapshot, WindowStore, WindowStoreError};

/// In-memory window store configuration.
#[derive(Debug, Clone)]
pub struct MemoryWindowStoreConfig {
    /// Identifier count above which the next check sweeps entries whose
    /// events have all aged out of their window.
    pub max_identifiers: usize,
}

impl Default for MemoryWindowStoreConfig {
    fn default() -> Self {
        Self {
            max_identifiers: 100_000,
        }
    }
}

impl MemoryWindowStoreConfig {
    pub fn from_env() -> Self {
        Self {
            max_identifiers: std::env::var("RATE_LIMIT_MAX_IDENTIFIERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100_000),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Event {
    timestamp: f64,
    count: u32,
}

#[derive(Debug, Default)]
struct WindowRecord {
    events: Vec<Event>,
    /// Window the record was last checked under, kept so the capacity sweep
    /// can tell when every event has aged out.
    window_seconds: f64,
}

/// Sliding-window log over a mutex-guarded map.
///
/// The lock is held across prune+count+append, which serializes concurrent
/// checks for the same identifier (and, with this coarse whole-map lock,
/// for all identifiers). Limits are per-process, not distributed.
///
/// Memory bound: records are pruned lazily on access, and once the map
/// exceeds `max_identifiers` the next check drops identifiers whose events
/// have all expired. No background task.
pub struct MemoryWindowStore {
    records: Mutex<HashMap<String, WindowRecord>>,
    config: MemoryWindowStoreConfig,
}

impl MemoryWindowStore {
    pub fn new(config: MemoryWindowStoreConfig) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn from_env() -> Self {
        Self::new(MemoryWindowStoreConfig::from_env())
    }

    fn sweep(records: &mut HashMap<String, WindowRecord>, now: f64) {
        let before = records.len();
        records.retain(|_, record| {
            record
                .events
                .iter()
                .any(|event| event.timestamp > now - record.window_seconds)
        });
        tracing::debug!(
            swept = before - records.len(),
            remaining = records.len(),
            "swept stale rate limit identifiers"
        );
    }
}

impl Default for MemoryWindowStore {
    fn default() -> Self {
        Self::new(MemoryWindowStoreConfig::default())
    }
}

#[async_trait]
impl WindowStore for MemoryWindowStore {
    async fn record_and_count(
        &self,
        identifier: &str,
        limit: u32,
        window: Duration,
        now: f64,
    ) -> Result<WindowSnapshot, WindowStoreError> {
        let window_seconds = window.as_secs_f64();
        let mut records = self.records.lock().await;

        if records.len() >= self.config.max_identifiers && !records.contains_key(identifier) {
            Self::sweep(&mut records, now);
        }

        let record = records.entry(identifier.to_string()).or_default();
        record.window_seconds = window_seconds;

        let cutoff = now - window_seconds;
        record.events.retain(|event| event.timestamp > cutoff);

        let count_before: u32 = record.events.iter().map(|event| event.count).sum();
        if count_before < limit {
            record.events.push(Event {
                timestamp: now,
                count: 1,
            });
        }

        let oldest_timestamp = record
            .events
            .iter()
            .map(|event| event.timestamp)
            .fold(None, |min: Option<f64>, ts| {
                Some(min.map_or(ts, |m| m.min(ts)))
            });

        Ok(WindowSnapshot {
            count_before,
            oldest_timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn admits_up_to_limit_then_blocks() {
        let store = MemoryWindowStore::default();
        let t0 = 1_700_000_000.0;

        for i in 0..5u32 {
            let snapshot = store
                .record_and_count("user:u1", 5, WINDOW, t0 + i as f64)
                .await
                .unwrap();
            assert_eq!(snapshot.count_before, i);
        }

        // Over the limit: counted but not recorded.
        let snapshot = store
            .record_and_count("user:u1", 5, WINDOW, t0 + 10.0)
            .await
            .unwrap();
        assert_eq!(snapshot.count_before, 5);
        let snapshot = store
            .record_and_count("user:u1", 5, WINDOW, t0 + 11.0)
            .await
            .unwrap();
        assert_eq!(snapshot.count_before, 5, "denied requests must not be recorded");
    }

    #[tokio::test]
    async fn prunes_events_outside_window() {
        let store = MemoryWindowStore::default();
        let t0 = 1_700_000_000.0;

        for i in 0..3u32 {
            store
                .record_and_count("ip:203.0.113.7", 3, WINDOW, t0 + i as f64)
                .await
                .unwrap();
        }

        // Just past the first event's exit only two remain.
        let snapshot = store
            .record_and_count("ip:203.0.113.7", 3, WINDOW, t0 + 60.1)
            .await
            .unwrap();
        assert_eq!(snapshot.count_before, 2);
        assert_eq!(snapshot.oldest_timestamp, Some(t0 + 1.0));
    }

    #[tokio::test]
    async fn boundary_event_is_discarded() {
        let store = MemoryWindowStore::default();
        let t0 = 1_700_000_000.0;

        store.record_and_count("k", 10, WINDOW, t0).await.unwrap();

        // timestamp <= now - window falls out: at exactly t0 + 60 the first
        // event no longer counts.
        let snapshot = store
            .record_and_count("k", 10, WINDOW, t0 + 60.0)
            .await
            .unwrap();
        assert_eq!(snapshot.count_before, 0);
    }

    #[tokio::test]
    async fn identifiers_do_not_interact() {
        let store = MemoryWindowStore::default();
        let now = 1_700_000_000.0;

        for _ in 0..3 {
            store.record_and_count("a", 3, WINDOW, now).await.unwrap();
        }
        let snapshot = store.record_and_count("b", 3, WINDOW, now).await.unwrap();
        assert_eq!(snapshot.count_before, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_burst_admits_exactly_limit() {
        let store = Arc::new(MemoryWindowStore::default());
        let limit = 10u32;
        let now = 1_700_000_000.0;

        let mut handles = Vec::new();
        for _ in 0..limit + 5 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .record_and_count("user:burst", limit, WINDOW, now)
                    .await
                    .unwrap()
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            let snapshot = handle.await.unwrap();
            if snapshot.count_before < limit {
                admitted += 1;
            }
        }
        assert_eq!(admitted, limit);
    }

    #[tokio::test]
    async fn capacity_sweep_drops_aged_out_identifiers() {
        let store = MemoryWindowStore::new(MemoryWindowStoreConfig { max_identifiers: 2 });
        let t0 = 1_700_000_000.0;

        store.record_and_count("a", 5, WINDOW, t0).await.unwrap();
        store.record_and_count("b", 5, WINDOW, t0).await.unwrap();

        // Both earlier identifiers have aged out by the time "c" arrives, so
        // the over-capacity sweep reclaims them.
        store
            .record_and_count("c", 5, WINDOW, t0 + 120.0)
            .await
            .unwrap();

        let records = store.records.lock().await;
        assert_eq!(records.len(), 1);
        assert!(records.contains_key("c"));
    }
}
