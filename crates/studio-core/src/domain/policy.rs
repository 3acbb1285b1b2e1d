use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Caller role used for role-based quota buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Anonymous,
    Authenticated,
    Admin,
}

impl Role {
    /// Parse a role name. Unrecognized names return `None`; callers degrade
    /// to [`Role::Anonymous`].
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "anonymous" => Some(Role::Anonymous),
            "authenticated" => Some(Role::Authenticated),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Anonymous => "anonymous",
            Role::Authenticated => "authenticated",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request quota: at most `max_requests` within a trailing window of
/// `window_seconds`. Immutable after startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl Policy {
    pub const fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            max_requests,
            window_seconds,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// The quota bucket a request resolved into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Exact `"METHOD PATH"` match.
    Endpoint(String),
    /// Role-based fallback.
    Role(Role),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Endpoint(key) => f.write_str(key),
            Scope::Role(role) => f.write_str(role.as_str()),
        }
    }
}

/// Static scope -> quota mapping, built once at startup and passed by
/// reference into the limiter.
///
/// Resolution order: exact `"METHOD PATH"` key first (case-sensitive, no
/// pattern matching), then the caller's role, then the anonymous default.
/// Resolution is pure and never fails.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    endpoints: HashMap<String, Policy>,
    roles: HashMap<Role, Policy>,
    anonymous_default: Policy,
}

impl PolicyTable {
    pub fn new(anonymous_default: Policy) -> Self {
        let mut roles = HashMap::new();
        roles.insert(Role::Anonymous, anonymous_default);
        Self {
            endpoints: HashMap::new(),
            roles,
            anonymous_default,
        }
    }

    pub fn set_role_policy(&mut self, role: Role, policy: Policy) {
        if role == Role::Anonymous {
            self.anonymous_default = policy;
        }
        self.roles.insert(role, policy);
    }

    /// Register an endpoint-specific policy keyed by `"METHOD PATH"`.
    /// Endpoint policies always win over role-based ones.
    pub fn set_endpoint_policy(&mut self, method: &str, path: &str, policy: Policy) {
        self.endpoints.insert(format!("{method} {path}"), policy);
    }

    /// Resolve the applicable policy for a request. Returns the matched
    /// scope alongside the policy for logging.
    pub fn resolve(&self, method: &str, path: &str, role: Role) -> (Scope, Policy) {
        let key = format!("{method} {path}");
        if let Some(policy) = self.endpoints.get(&key) {
            return (Scope::Endpoint(key), *policy);
        }
        match self.roles.get(&role) {
            Some(policy) => (Scope::Role(role), *policy),
            None => (Scope::Role(Role::Anonymous), self.anonymous_default),
        }
    }
}

impl Default for PolicyTable {
    /// Production policy table: hourly role quotas plus tighter limits on
    /// the expensive mutation endpoints.
    fn default() -> Self {
        let mut table = PolicyTable::new(Policy::new(100, 3600));
        table.set_role_policy(Role::Authenticated, Policy::new(1000, 3600));
        table.set_role_policy(Role::Admin, Policy::new(10000, 3600));
        table.set_endpoint_policy("POST", "/api/projects", Policy::new(10, 3600));
        table.set_endpoint_policy("POST", "/api/workflows/start", Policy::new(20, 3600));
        table.set_endpoint_policy("POST", "/api/payments/charge", Policy::new(50, 3600));
        table
    }
}
