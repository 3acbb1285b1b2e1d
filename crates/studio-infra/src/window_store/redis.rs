//! Redis-backed sliding window for multi-instance deployments.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use uuid::Uuid;

use studio_core::ports::{WindowSnapshot, WindowStore, WindowStoreError};

/// Redis window store configuration.
#[derive(Debug, Clone)]
pub struct RedisWindowStoreConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Per-check round-trip bound; exceeding it reports the store as
    /// unavailable so the limiter's failure policy applies.
    pub operation_timeout: Duration,
    /// Key prefix for window keys
    pub key_prefix: String,
}

impl Default for RedisWindowStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_millis(500),
            key_prefix: "ratelimit".to_string(),
        }
    }
}

impl RedisWindowStoreConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(
                std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            operation_timeout: Duration::from_millis(
                std::env::var("RATE_LIMIT_OP_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            ),
            key_prefix: std::env::var("RATE_LIMIT_KEY_PREFIX")
                .unwrap_or_else(|_| "ratelimit".to_string()),
        }
    }
}

/// Sliding-window log over a Redis sorted set, one key per identifier with
/// event timestamps as scores.
///
/// The prune/count/conditional-record sequence runs in a single Lua script,
/// which Redis executes atomically, so limits stay exact across any number
/// of concurrent processes. The key TTL set alongside each record bounds
/// storage for idle identifiers; the score-range prune remains the source
/// of truth for the window boundary.
pub struct RedisWindowStore {
    conn: ConnectionManager,
    config: RedisWindowStoreConfig,
    script: Script,
}

// Prunes events at or before the window boundary, counts the survivors,
// and records the current request only while under the limit. Returns the
// pre-request count and the oldest surviving score ('' when empty).
const RECORD_AND_COUNT: &str = r#"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local member = ARGV[4]

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
if count < limit then
    redis.call('ZADD', key, now, member)
    redis.call('EXPIRE', key, window)
end

local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
if #oldest == 0 then
    return {count, ''}
end
return {count, oldest[2]}
"#;

impl RedisWindowStore {
    pub async fn new(config: RedisWindowStoreConfig) -> Result<Self, WindowStoreError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| WindowStoreError::Unavailable(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn_manager_fut = ConnectionManager::new(client);
        let conn = tokio::time::timeout(config.connect_timeout, conn_manager_fut)
            .await
            .map_err(|_| WindowStoreError::Unavailable("connection timed out".to_string()))?
            .map_err(|e| WindowStoreError::Unavailable(e.to_string()))?;

        tracing::info!(url = %config.url, "Connected to Redis window store");

        Ok(Self {
            conn,
            config,
            script: Script::new(RECORD_AND_COUNT),
        })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, WindowStoreError> {
        Self::new(RedisWindowStoreConfig::from_env()).await
    }

    fn make_key(&self, identifier: &str) -> String {
        format!("{}:{}", self.config.key_prefix, identifier)
    }
}

#[async_trait]
impl WindowStore for RedisWindowStore {
    async fn record_and_count(
        &self,
        identifier: &str,
        limit: u32,
        window: Duration,
        now: f64,
    ) -> Result<WindowSnapshot, WindowStoreError> {
        let key = self.make_key(identifier);
        let mut conn = self.conn.clone();
        // Unique member so two events at the same instant both count.
        let member = Uuid::new_v4().to_string();

        let mut invocation = self.script.key(&key);
        invocation
            .arg(limit)
            .arg(window.as_secs())
            .arg(now)
            .arg(&member);

        let (count_before, oldest): (u32, String) = tokio::time::timeout(
            self.config.operation_timeout,
            invocation.invoke_async(&mut conn),
        )
        .await
        .map_err(|_| WindowStoreError::Unavailable("operation timed out".to_string()))?
        .map_err(|e| WindowStoreError::Unavailable(e.to_string()))?;

        let oldest_timestamp = if oldest.is_empty() {
            None
        } else {
            Some(
                oldest
                    .parse::<f64>()
                    .map_err(|e| WindowStoreError::Operation(format!("bad score: {e}")))?,
            )
        };

        Ok(WindowSnapshot {
            count_before,
            oldest_timestamp,
        })
    }
}
