//! Server configuration

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 9002;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Runtime worker threads; `None` uses one per CPU
    pub worker_threads: Option<usize>,
    /// Allow list checked against the handshake's `api_key`
    pub api_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            worker_threads: None,
            api_keys: vec!["API_KEY_12345".to_string(), "API_KEY_67890".to_string()],
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
            .filter(|n| *n > 0)
            .unwrap_or_else(num_cpus::get)
    }
}
