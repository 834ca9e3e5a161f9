//! Credential provider
//!
//! Obtains the refresh token the transport authenticates with. Tokens are
//! exchanged over HTTPS with the `client_credentials` grant and cached on disk
//! until they expire.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use relay_core::{RelayError, Result, RpcError, RpcRequest, methods};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::config::CredentialsSection;

/// Tokens within this margin of expiry are refreshed
const EXPIRY_MARGIN_SECS: i64 = 60;

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// A token that is valid now
    async fn valid_token(&self) -> Result<String>;
}

/// Pre-issued token
pub struct StaticCredentials(pub String);

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn valid_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// On-disk token cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenCache {
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenCache {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.refresh_token.is_empty()
            && self.expires_at > now + ChronoDuration::seconds(EXPIRY_MARGIN_SECS)
    }

    pub fn load(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable token cache");
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
    }
}

#[derive(Debug, Deserialize)]
struct AuthResult {
    refresh_token: String,
    expires_in: i64,
}

/// OAuth2-style `client_credentials` exchange with a file-backed cache
pub struct ClientCredentialsProvider {
    http: reqwest::Client,
    auth_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    cache_path: PathBuf,
    cached: Mutex<Option<TokenCache>>,
}

impl ClientCredentialsProvider {
    pub fn new(section: &CredentialsSection) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth_url: section.auth_url.clone(),
            client_id: section.client_id.clone(),
            client_secret: section.client_secret.clone(),
            scope: section.scope.clone(),
            cache_path: section.token_cache.clone(),
            cached: Mutex::new(None),
        }
    }

    async fn exchange(&self) -> Result<TokenCache> {
        let request = RpcRequest::new(
            methods::AUTH,
            json!({
                "grant_type": "client_credentials",
                "client_id": self.client_id,
                "client_secret": self.client_secret,
                "scope": self.scope,
            }),
        )
        .with_id(0);

        let response = self
            .http
            .post(&self.auth_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RelayError::Connection(e.to_string()))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| RelayError::AuthRejected(format!("HTTP {}: {}", status, e)))?;

        if let Some(error) = body.get("error") {
            let message = serde_json::from_value::<RpcError>(error.clone())
                .map(|err| err.message)
                .unwrap_or_else(|_| error.to_string());
            return Err(RelayError::AuthRejected(message));
        }

        let result: AuthResult = body
            .get("result")
            .cloned()
            .ok_or_else(|| RelayError::AuthRejected(format!("HTTP {}: no result", status)))
            .and_then(|result| {
                serde_json::from_value(result).map_err(|e| RelayError::AuthRejected(e.to_string()))
            })?;

        Ok(TokenCache {
            refresh_token: result.refresh_token,
            expires_at: Utc::now() + ChronoDuration::seconds(result.expires_in),
        })
    }
}

#[async_trait]
impl CredentialProvider for ClientCredentialsProvider {
    async fn valid_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if cached.is_none() {
            *cached = TokenCache::load(&self.cache_path);
        }

        if let Some(cache) = cached.as_ref() {
            if cache.is_valid_at(Utc::now()) {
                return Ok(cache.refresh_token.clone());
            }
            tracing::info!("Token expired, refreshing");
        } else {
            tracing::info!("No saved token, requesting one");
        }

        let fresh = self.exchange().await?;
        if let Err(e) = fresh.save(&self.cache_path) {
            tracing::warn!(path = %self.cache_path.display(), error = %e, "Error writing token cache");
        }
        tracing::info!(expires_at = %fresh.expires_at, "Obtained refresh token");
        let token = fresh.refresh_token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}
