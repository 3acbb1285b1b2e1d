//! Admission decisions - policy resolution plus window accounting.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::{Policy, PolicyTable, Role, Scope};
use crate::ports::{WindowStore, WindowStoreError};

/// Authenticated caller, as established by the auth layer.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
}

/// Per-request input assembled by the admission middleware.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub identity: Option<Identity>,
    pub source_ip: String,
}

impl RequestContext {
    /// The quota-tracking key: `user:<id>` when authenticated, else
    /// `ip:<addr>`. Authenticated identity takes precedence.
    fn identifier(&self) -> String {
        match &self.identity {
            Some(identity) => format!("user:{}", identity.user_id),
            None => format!("ip:{}", self.source_ip),
        }
    }

    fn role(&self) -> Role {
        self.identity
            .as_ref()
            .map(|identity| identity.role)
            .unwrap_or(Role::Anonymous)
    }
}

/// Admission verdict plus the quota metadata exposed as response headers.
/// Computed fresh on every check; never persisted.
#[derive(Debug, Clone)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    /// Requests left in the window after this one, never negative.
    pub remaining: u32,
    /// Unix timestamp at which the oldest counted event exits the window.
    pub reset_at: i64,
    /// Whole seconds until a retry can succeed; only set on denial.
    pub retry_after: Option<u64>,
}

/// Behavior when the window store cannot be reached (distributed case).
/// Applied uniformly to every check; infrastructure faults never surface to
/// callers as anything other than admitted or denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Admit and log. Favors availability.
    Open,
    /// Deny with a full-window retry hint. Favors strict enforcement.
    Closed,
}

/// Limiter-boundary errors. Store faults are absorbed by the failure
/// policy; only a caller contract violation surfaces here, so middleware
/// can distinguish "misconfigured" from "throttled".
#[derive(Debug, thiserror::Error)]
pub enum LimitError {
    #[error("invalid rate limit input: {0}")]
    InvalidRequest(&'static str),
}

/// Resolves the applicable policy for a request, drives the window store,
/// and produces the admission [`Decision`].
pub struct Limiter {
    policies: PolicyTable,
    store: Arc<dyn WindowStore>,
    failure_policy: FailurePolicy,
}

impl Limiter {
    pub fn new(
        policies: PolicyTable,
        store: Arc<dyn WindowStore>,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            policies,
            store,
            failure_policy,
        }
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Check a request against its resolved quota.
    pub async fn check(&self, request: &RequestContext) -> Result<Decision, LimitError> {
        let now = Utc::now().timestamp_millis() as f64 / 1000.0;
        self.check_at(request, now).await
    }

    /// Like [`Limiter::check`] with an explicit clock reading.
    pub async fn check_at(
        &self,
        request: &RequestContext,
        now: f64,
    ) -> Result<Decision, LimitError> {
        if request.method.is_empty() || request.path.is_empty() {
            return Err(LimitError::InvalidRequest("method and path must be non-empty"));
        }
        if request.identity.is_none() && request.source_ip.is_empty() {
            return Err(LimitError::InvalidRequest("anonymous request without a source ip"));
        }

        let identifier = request.identifier();
        let (scope, policy) = self
            .policies
            .resolve(&request.method, &request.path, request.role());

        let snapshot = match self
            .store
            .record_and_count(&identifier, policy.max_requests, policy.window(), now)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => return Ok(self.on_store_failure(&identifier, &scope, policy, now, e)),
        };

        // The store compared the same pre-request count against the same
        // limit when deciding whether to record, so the two cannot disagree.
        let allowed = snapshot.count_before < policy.max_requests;
        let reset_time = snapshot
            .oldest_timestamp
            .map(|oldest| oldest + policy.window_seconds as f64)
            .unwrap_or(now + policy.window_seconds as f64);
        let remaining = policy
            .max_requests
            .saturating_sub(snapshot.count_before)
            .saturating_sub(1);
        let retry_after = (!allowed).then(|| (reset_time - now).max(0.0) as u64);

        if !allowed {
            tracing::debug!(%identifier, %scope, limit = policy.max_requests, "request denied by rate limit");
        }

        Ok(Decision {
            allowed,
            limit: policy.max_requests,
            remaining,
            reset_at: reset_time as i64,
            retry_after,
        })
    }

    fn on_store_failure(
        &self,
        identifier: &str,
        scope: &Scope,
        policy: Policy,
        now: f64,
        error: WindowStoreError,
    ) -> Decision {
        tracing::error!(
            %identifier,
            %scope,
            error = %error,
            policy = ?self.failure_policy,
            "window store unavailable, applying failure policy"
        );
        let reset_at = (now + policy.window_seconds as f64) as i64;
        match self.failure_policy {
            FailurePolicy::Open => Decision {
                allowed: true,
                limit: policy.max_requests,
                remaining: policy.max_requests.saturating_sub(1),
                reset_at,
                retry_after: None,
            },
            FailurePolicy::Closed => Decision {
                allowed: false,
                limit: policy.max_requests,
                remaining: 0,
                reset_at,
                retry_after: Some(policy.window_seconds),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::WindowSnapshot;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Minimal sliding-window log, enough to exercise the limiter without
    /// pulling in an infrastructure crate.
    #[derive(Default)]
    struct LogStore {
        events: Mutex<HashMap<String, Vec<f64>>>,
    }

    #[async_trait]
    impl WindowStore for LogStore {
        async fn record_and_count(
            &self,
            identifier: &str,
            limit: u32,
            window: Duration,
            now: f64,
        ) -> Result<WindowSnapshot, WindowStoreError> {
            let mut events = self.events.lock().unwrap();
            let log = events.entry(identifier.to_string()).or_default();
            let cutoff = now - window.as_secs_f64();
            log.retain(|&ts| ts > cutoff);
            let count_before = log.len() as u32;
            if count_before < limit {
                log.push(now);
            }
            let oldest_timestamp =
                (!log.is_empty()).then(|| log.iter().copied().fold(f64::INFINITY, f64::min));
            Ok(WindowSnapshot {
                count_before,
                oldest_timestamp,
            })
        }
    }

    /// Store that always fails, for failure-policy tests.
    struct DownStore;

    #[async_trait]
    impl WindowStore for DownStore {
        async fn record_and_count(
            &self,
            _identifier: &str,
            _limit: u32,
            _window: Duration,
            _now: f64,
        ) -> Result<WindowSnapshot, WindowStoreError> {
            Err(WindowStoreError::Unavailable("connection refused".to_string()))
        }
    }

    fn limiter_with(store: Arc<dyn WindowStore>, failure_policy: FailurePolicy) -> Limiter {
        Limiter::new(PolicyTable::default(), store, failure_policy)
    }

    fn anonymous_request(ip: &str) -> RequestContext {
        RequestContext {
            method: "GET".to_string(),
            path: "/api/projects".to_string(),
            identity: None,
            source_ip: ip.to_string(),
        }
    }

    fn project_create(user_id: Uuid) -> RequestContext {
        RequestContext {
            method: "POST".to_string(),
            path: "/api/projects".to_string(),
            identity: Some(Identity {
                user_id,
                role: Role::Authenticated,
            }),
            source_ip: "10.0.0.1".to_string(),
        }
    }

    #[tokio::test]
    async fn quota_example_scenario() {
        // 10 per hour on POST /api/projects; remaining descends 9..0, the
        // 11th within the hour is denied with retry_after = 3600 - elapsed.
        let limiter = limiter_with(Arc::new(LogStore::default()), FailurePolicy::Open);
        let request = project_create(Uuid::new_v4());
        let t0 = 1_700_000_000.0;

        for i in 0..10u32 {
            let decision = limiter
                .check_at(&request, t0 + i as f64 * 0.1)
                .await
                .unwrap();
            assert!(decision.allowed, "request {} should be admitted", i + 1);
            assert_eq!(decision.limit, 10);
            assert_eq!(decision.remaining, 9 - i);
        }

        let decision = limiter.check_at(&request, t0 + 5.0).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.retry_after, Some(3595));
        assert_eq!(decision.reset_at, (t0 + 3600.0) as i64);
    }

    #[tokio::test]
    async fn window_slides_past_oldest_event() {
        let limiter = limiter_with(Arc::new(LogStore::default()), FailurePolicy::Open);
        let request = project_create(Uuid::new_v4());
        let t0 = 1_700_000_000.0;

        for i in 0..10u32 {
            assert!(limiter.check_at(&request, t0 + i as f64).await.unwrap().allowed);
        }
        assert!(!limiter.check_at(&request, t0 + 100.0).await.unwrap().allowed);

        // Just past the first event's exit the quota frees up again.
        let decision = limiter.check_at(&request, t0 + 3600.1).await.unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn identifiers_are_isolated() {
        let limiter = limiter_with(Arc::new(LogStore::default()), FailurePolicy::Open);
        let exhausted = project_create(Uuid::new_v4());
        let fresh = project_create(Uuid::new_v4());
        let t0 = 1_700_000_000.0;

        for i in 0..10u32 {
            assert!(limiter.check_at(&exhausted, t0 + i as f64).await.unwrap().allowed);
        }
        assert!(!limiter.check_at(&exhausted, t0 + 20.0).await.unwrap().allowed);

        let decision = limiter.check_at(&fresh, t0 + 20.0).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 9);
    }

    #[tokio::test]
    async fn authenticated_identity_takes_precedence_over_ip() {
        let store = Arc::new(LogStore::default());
        let limiter = limiter_with(store.clone(), FailurePolicy::Open);
        let user_id = Uuid::new_v4();
        let request = project_create(user_id);

        limiter.check_at(&request, 1_700_000_000.0).await.unwrap();

        let events = store.events.lock().unwrap();
        assert!(events.contains_key(&format!("user:{user_id}")));
        assert!(!events.keys().any(|k| k.starts_with("ip:")));
    }

    #[tokio::test]
    async fn empty_window_resets_a_full_window_out() {
        let limiter = limiter_with(Arc::new(LogStore::default()), FailurePolicy::Open);
        let request = anonymous_request("203.0.113.7");
        let now = 1_700_000_000.0;

        let decision = limiter.check_at(&request, now).await.unwrap();
        assert!(decision.allowed);
        // First event is its own oldest; reset is its exit from the window.
        assert_eq!(decision.reset_at, (now + 3600.0) as i64);
    }

    #[tokio::test]
    async fn malformed_input_is_not_a_denial() {
        let limiter = limiter_with(Arc::new(LogStore::default()), FailurePolicy::Open);

        let mut request = anonymous_request("");
        assert!(matches!(
            limiter.check_at(&request, 0.0).await,
            Err(LimitError::InvalidRequest(_))
        ));

        request.source_ip = "203.0.113.7".to_string();
        request.method = String::new();
        assert!(matches!(
            limiter.check_at(&request, 0.0).await,
            Err(LimitError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn fail_open_admits_on_store_fault() {
        let limiter = limiter_with(Arc::new(DownStore), FailurePolicy::Open);
        let request = anonymous_request("203.0.113.7");

        let decision = limiter.check_at(&request, 1_700_000_000.0).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.limit, 100);
        assert_eq!(decision.retry_after, None);
    }

    #[tokio::test]
    async fn fail_closed_denies_on_store_fault() {
        let limiter = limiter_with(Arc::new(DownStore), FailurePolicy::Closed);
        let request = anonymous_request("203.0.113.7");

        let decision = limiter.check_at(&request, 1_700_000_000.0).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.retry_after, Some(3600));
    }
}
