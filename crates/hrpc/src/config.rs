//! # Remote Identity
//!
//! Everything a connection needs to know about its peer, fixed at construction.

use std::time::Duration;

/// Default per-call deadline when the caller does not give one.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(60);

/// Target address, protocol and tuning for one connection.
///
/// Built with fluent setters, then handed to a connection which never mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIdentity {
    address: String,
    protocol: Option<String>,
    credential: Option<String>,
    rpc_timeout: Duration,
    no_delay: bool,
    keep_alive: bool,
}

impl RemoteIdentity {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            protocol: None,
            credential: None,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            no_delay: true,
            keep_alive: true,
        }
    }

    /// Reads `HRPC_ADDR` (required), `HRPC_PROTOCOL` and `HRPC_TIMEOUT_MS`.
    ///
    /// Returns `None` when no address is configured. An unparsable timeout falls
    /// back to the default.
    pub fn from_env() -> Option<Self> {
        let address = std::env::var("HRPC_ADDR").ok()?;
        let mut identity = Self::new(address);
        if let Ok(protocol) = std::env::var("HRPC_PROTOCOL") {
            identity = identity.protocol(protocol);
        }
        if let Some(ms) = std::env::var("HRPC_TIMEOUT_MS").ok().and_then(|v| v.parse::<u64>().ok()) {
            identity = identity.rpc_timeout(Duration::from_millis(ms));
        }
        Some(identity)
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Stored for a future authenticated header; never sent today.
    pub fn credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Deadline applied to calls that do not pass their own. Zero disables it.
    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    pub fn no_delay(mut self, on: bool) -> Self {
        self.no_delay = on;
        self
    }

    pub fn keep_alive(mut self, on: bool) -> Self {
        self.keep_alive = on;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn protocol_name(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    pub fn credential_value(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    pub fn default_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    pub fn is_no_delay(&self) -> bool {
        self.no_delay
    }

    pub fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let id = RemoteIdentity::new("localhost:60020");
        assert_eq!(id.address(), "localhost:60020");
        assert_eq!(id.protocol_name(), None);
        assert_eq!(id.default_timeout(), DEFAULT_RPC_TIMEOUT);
        assert!(id.is_no_delay());
        assert!(id.is_keep_alive());
    }

    #[test]
    fn test_builder_overrides() {
        let id = RemoteIdentity::new("h:1")
            .protocol("HRegionInterface")
            .credential("ticket")
            .rpc_timeout(Duration::from_millis(250))
            .no_delay(false)
            .keep_alive(false);

        assert_eq!(id.protocol_name(), Some("HRegionInterface"));
        assert_eq!(id.credential_value(), Some("ticket"));
        assert_eq!(id.default_timeout(), Duration::from_millis(250));
        assert!(!id.is_no_delay());
        assert!(!id.is_keep_alive());
    }
}
