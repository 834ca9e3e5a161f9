//! Transport configuration

use std::time::Duration;

/// Exchange test environment
pub const DEFAULT_EXCHANGE_URL: &str = "wss://test.deribit.com/ws/api/v2";

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub url: String,
    /// Bound on the handshake plus the authenticate round trip
    pub connect_timeout: Duration,
    /// Default bound for correlated requests
    pub request_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_EXCHANGE_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl TransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
