//! Application configuration loaded from environment variables.

use std::env;

use studio_core::domain::{Policy, Role};

/// Which window store backs the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBackend {
    Memory,
    Redis,
}

/// Rate limiter wiring.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub backend: RateLimitBackend,
    /// Deny instead of admit when the window store is unreachable.
    pub fail_closed: bool,
    /// Role quota overrides applied on top of the default policy table.
    pub role_overrides: Vec<(Role, Policy)>,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub rate_limit: RateLimitSettings,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let backend = match env::var("RATE_LIMIT_BACKEND").as_deref() {
            Ok("redis") => RateLimitBackend::Redis,
            _ => RateLimitBackend::Memory,
        };

        let fail_closed = env::var("RATE_LIMIT_FAIL_CLOSED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            rate_limit: RateLimitSettings {
                backend,
                fail_closed,
                role_overrides: Self::parse_role_overrides(),
            },
        }
    }

    /// Parse role quota overrides from environment.
    /// Format: RATE_LIMIT_<ROLE>=<max_requests>,<window_seconds>
    /// Example: RATE_LIMIT_AUTHENTICATED=2000,3600
    fn parse_role_overrides() -> Vec<(Role, Policy)> {
        let mut overrides = Vec::new();

        for (key, value) in env::vars() {
            if let Some(name) = key.strip_prefix("RATE_LIMIT_") {
                let Some(role) = Role::parse(&name.to_lowercase()) else {
                    continue;
                };
                match parse_quota(&value) {
                    Some(policy) => overrides.push((role, policy)),
                    None => {
                        tracing::warn!(%key, %value, "ignoring malformed rate limit override");
                    }
                }
            }
        }

        overrides
    }
}

/// Parse a `"<max_requests>,<window_seconds>"` quota pair. Both values must
/// be positive integers.
fn parse_quota(value: &str) -> Option<Policy> {
    let (max, window) = value.split_once(',')?;
    let max: u32 = max.trim().parse().ok()?;
    let window: u64 = window.trim().parse().ok()?;
    if max == 0 || window == 0 {
        return None;
    }
    Some(Policy::new(max, window))
}
