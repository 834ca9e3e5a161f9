//! Gateway configuration

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Upper bound on every exchange round trip made by the gateway
    pub response_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(30),
        }
    }
}

impl GatewayConfig {
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }
}
