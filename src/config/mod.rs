//! Static configuration injected into the controller and steps.
//!
//! Values are built once at startup from CLI arguments and passed in by
//! value; steps never read process-wide state.

use chrono::Duration;

const DEFAULT_FLOW_TTL_SECONDS: i64 = 60 * 60;

#[derive(Clone, Debug)]
pub struct FlowConfig {
    ttl_seconds: i64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ttl_seconds: DEFAULT_FLOW_TTL_SECONDS,
        }
    }

    /// Lifetime of a flow instance; non-positive values keep the default.
    #[must_use]
    pub fn with_ttl_seconds(mut self, seconds: i64) -> Self {
        if seconds > 0 {
            self.ttl_seconds = seconds;
        }
        self
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::seconds(self.ttl_seconds)
    }
}

#[derive(Clone, Debug)]
pub struct PasskeyConfig {
    enabled: bool,
}

impl Default for PasskeyConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PasskeyConfig {
    #[must_use]
    pub fn new() -> Self {
        Self { enabled: true }
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}

/// How the HTTP layer attributes requests to clients.
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpConfig {
    trust_proxy_headers: bool,
}

impl HttpConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the client address from `x-forwarded-for` / `x-real-ip`. Only
    /// enable this behind a proxy that overwrites those headers.
    #[must_use]
    pub fn with_trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    #[must_use]
    pub fn trust_proxy_headers(&self) -> bool {
        self.trust_proxy_headers
    }
}
