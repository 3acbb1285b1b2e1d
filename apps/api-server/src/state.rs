//! Application state - shared across all handlers.

use std::sync::Arc;

use studio_core::domain::PolicyTable;
use studio_core::ports::WindowStore;
use studio_core::{FailurePolicy, Limiter};
use studio_infra::MemoryWindowStore;

use crate::config::{AppConfig, RateLimitBackend};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<Limiter>,
}

impl AppState {
    /// Build the application state with appropriate implementations.
    pub async fn new(config: &AppConfig) -> Self {
        let mut policies = PolicyTable::default();
        for (role, policy) in &config.rate_limit.role_overrides {
            tracing::info!(role = %role, max = policy.max_requests, window = policy.window_seconds, "applying rate limit override");
            policies.set_role_policy(*role, *policy);
        }

        let store = Self::build_store(config).await;

        let failure_policy = if config.rate_limit.fail_closed {
            FailurePolicy::Closed
        } else {
            FailurePolicy::Open
        };

        tracing::info!(
            backend = ?config.rate_limit.backend,
            failure_policy = ?failure_policy,
            "rate limiter initialized"
        );

        Self {
            limiter: Arc::new(Limiter::new(policies, store, failure_policy)),
        }
    }

    #[cfg(feature = "redis")]
    async fn build_store(config: &AppConfig) -> Arc<dyn WindowStore> {
        use studio_infra::RedisWindowStore;

        match config.rate_limit.backend {
            RateLimitBackend::Memory => Arc::new(MemoryWindowStore::from_env()),
            RateLimitBackend::Redis => match RedisWindowStore::from_env().await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    tracing::error!(
                        "Failed to connect to Redis window store: {}. Using in-memory fallback.",
                        e
                    );
                    Arc::new(MemoryWindowStore::from_env())
                }
            },
        }
    }

    #[cfg(not(feature = "redis"))]
    async fn build_store(config: &AppConfig) -> Arc<dyn WindowStore> {
        if config.rate_limit.backend == RateLimitBackend::Redis {
            tracing::warn!("Built without the redis feature - using in-memory window store");
        }
        Arc::new(MemoryWindowStore::from_env())
    }
}
