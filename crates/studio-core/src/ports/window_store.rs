//! Sliding-window store port.

use std::time::Duration;

use async_trait::async_trait;

/// Occupancy of an identifier's window observed during a check.
#[derive(Debug, Clone, Copy)]
pub struct WindowSnapshot {
    /// Events in the window before the current request. This is the
    /// authoritative count the admission decision is made from.
    pub count_before: u32,
    /// Timestamp (unix seconds) of the oldest surviving event after the
    /// call, or `None` when the window is empty.
    pub oldest_timestamp: Option<f64>,
}

/// Window store errors.
#[derive(Debug, thiserror::Error)]
pub enum WindowStoreError {
    /// The backing store could not be reached or timed out. The limiter
    /// maps this to its configured fail-open/fail-closed policy.
    #[error("window store unavailable: {0}")]
    Unavailable(String),

    #[error("window store operation failed: {0}")]
    Operation(String),
}

/// Records timestamped request events per identifier and answers how many
/// fall within the trailing window.
///
/// `record_and_count` is one logical operation: prune events with
/// `timestamp <= now - window`, count the remainder, and record `(now, 1)`
/// only when the pre-request count is below `limit`. The conditional append
/// lives inside the store so the whole sequence is atomic per identifier
/// with respect to concurrent checks; otherwise two racing requests can
/// both observe an occupancy under the limit and both be admitted.
///
/// Identifiers are independent; no cross-identifier interaction. Window
/// records are created lazily on first use, and stale events are reclaimed
/// on access rather than by a background sweep.
#[async_trait]
pub trait WindowStore: Send + Sync {
    async fn record_and_count(
        &self,
        identifier: &str,
        limit: u32,
        window: Duration,
        now: f64,
    ) -> Result<WindowSnapshot, WindowStoreError>;
}
