//! Configuration for the sync engine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Credentials and endpoint for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server base URL (e.g., "https://hdml.example.com").
    pub host: String,
    /// Tenant identifier.
    pub tenant: String,
    /// Tenant access token, exchanged for a session token.
    pub token: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl ClientConfig {
    /// Creates a new client configuration.
    pub fn new(
        host: impl Into<String>,
        tenant: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            tenant: tenant.into(),
            token: token.into(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns true if host, tenant and token are all non-empty.
    pub fn is_complete(&self) -> bool {
        !self.host.is_empty() && !self.tenant.is_empty() && !self.token.is_empty()
    }

    /// Base URL of the tenant API: `{host}/public/api/v1/{tenant}`.
    pub fn api_base(&self) -> String {
        format!(
            "{}/public/api/v1/{}",
            self.host.trim_end_matches('/'),
            self.tenant
        )
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("", "", "")
    }
}

/// Identity data carried by a `props` message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Server base URL.
    #[serde(default)]
    pub host: String,
    /// Tenant identifier.
    #[serde(default)]
    pub tenant: String,
    /// Tenant access token.
    #[serde(default)]
    pub token: String,
}

impl Identity {
    /// Creates an identity.
    pub fn new(
        host: impl Into<String>,
        tenant: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            tenant: tenant.into(),
            token: token.into(),
        }
    }

    /// Builds a client configuration with the given timeout.
    pub fn to_config(&self, timeout: Duration) -> ClientConfig {
        ClientConfig::new(&self.host, &self.tenant, &self.token).with_timeout(timeout)
    }
}

/// Configuration for the background worker and its producers.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Debounce window for markup and identity producers.
    pub debounce: Duration,
    /// Capacity of the inbound message channel.
    pub channel_capacity: usize,
    /// Capacity of the outbound event channel.
    pub event_capacity: usize,
    /// Request timeout for clients the worker creates.
    pub timeout: Duration,
}

impl WorkerConfig {
    /// Creates a worker configuration with defaults.
    pub fn new() -> Self {
        Self {
            debounce: Duration::from_millis(5),
            channel_capacity: 64,
            event_capacity: 64,
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the inbound channel capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Sets the event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}
