//! Relay configuration
//!
//! Loaded from a JSON file; every section is optional. A handful of
//! environment variables override the file:
//!
//! - `RELAY_EXCHANGE_URL` → `exchange.ws_url`
//! - `RELAY_PORT` → `server.port`
//! - `RELAY_CLIENT_ID` / `RELAY_CLIENT_SECRET` → `credentials.*`

use std::path::{Path, PathBuf};
use std::time::Duration;

use relay_distribution::ServerConfig;
use relay_order_gateway::GatewayConfig;
use relay_transport::TransportConfig;
use relay_transport::config::DEFAULT_EXCHANGE_URL;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {error}")]
    Io { path: String, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid value for {key}: '{value}'")]
    Invalid { key: String, value: String },
}

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub exchange: ExchangeSection,
    pub credentials: CredentialsSection,
    pub server: ServerConfig,
    pub gateway: GatewaySection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeSection {
    pub ws_url: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ExchangeSection {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_EXCHANGE_URL.to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsSection {
    pub auth_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    pub token_cache: PathBuf,
}

impl Default for CredentialsSection {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            client_id: String::new(),
            client_secret: String::new(),
            scope: "session:relay expires:2592000".to_string(),
            token_cache: PathBuf::from("token_cache.json"),
        }
    }
}

fn default_auth_url() -> String {
    "https://test.deribit.com/api/v2/public/auth".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    pub response_timeout_secs: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            response_timeout_secs: 30,
        }
    }
}

impl RelayConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::from_json(&content)
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply `RELAY_*` environment overrides
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("RELAY_EXCHANGE_URL") {
            self.exchange.ws_url = url;
        }
        if let Some(port) = lookup("RELAY_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::Invalid {
                key: "RELAY_PORT".to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(id) = lookup("RELAY_CLIENT_ID") {
            self.credentials.client_id = id;
        }
        if let Some(secret) = lookup("RELAY_CLIENT_SECRET") {
            self.credentials.client_secret = secret;
        }
        Ok(())
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig::new(self.exchange.ws_url.clone())
            .with_connect_timeout(Duration::from_secs(self.exchange.connect_timeout_secs))
            .with_request_timeout(Duration::from_secs(self.exchange.request_timeout_secs))
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig::default()
            .with_response_timeout(Duration::from_secs(self.gateway.response_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = RelayConfig::from_json("{}").unwrap();
        assert_eq!(config.server.port, 9002);
        assert_eq!(config.exchange.ws_url, DEFAULT_EXCHANGE_URL);
        assert_eq!(config.gateway_config().response_timeout, Duration::from_secs(30));
        assert_eq!(
            config.transport_config().request_timeout,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_sections_are_parsed() {
        let config = RelayConfig::from_json(
            r#"{
                "exchange": { "ws_url": "ws://127.0.0.1:1234", "request_timeout_secs": 2 },
                "credentials": { "client_id": "id", "client_secret": "secret" },
                "server": { "host": "127.0.0.1", "port": 9100, "worker_threads": 2,
                            "api_keys": ["K1"] },
                "gateway": { "response_timeout_secs": 3 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.exchange.ws_url, "ws://127.0.0.1:1234");
        assert_eq!(config.exchange.connect_timeout_secs, 10);
        assert_eq!(config.credentials.client_id, "id");
        assert_eq!(config.server.api_keys, vec!["K1".to_string()]);
        assert_eq!(config.server.worker_threads(), 2);
        assert_eq!(config.gateway_config().response_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("RELAY_EXCHANGE_URL", "ws://override"),
            ("RELAY_PORT", "9300"),
            ("RELAY_CLIENT_SECRET", "s3cret"),
        ]
        .into_iter()
        .collect();

        let mut config = RelayConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.exchange.ws_url, "ws://override");
        assert_eq!(config.server.port, 9300);
        assert_eq!(config.credentials.client_secret, "s3cret");
        assert_eq!(config.credentials.client_id, "");
    }

    #[test]
    fn test_invalid_port_override() {
        let mut config = RelayConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "RELAY_PORT").then(|| "not-a-port".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = RelayConfig::from_file("/nonexistent/relay.json");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
