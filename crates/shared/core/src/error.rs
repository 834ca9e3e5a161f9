//! Error taxonomy shared by every relay component

use std::time::Duration;

use thiserror::Error;

use crate::rpc::RpcError;

#[derive(Error, Debug, Clone)]
pub enum RelayError {
    /// Handshake or transport failure, including "not connected"
    #[error("Connection error: {0}")]
    Connection(String),

    /// A bounded wait expired
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The exchange answered with an error object
    #[error("Remote error {}: {}", .0.code, .0.message)]
    Remote(RpcError),

    /// Parse failure or an expected field was missing / of the wrong type
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Input rejected locally, no request was sent
    #[error("Validation error: {0}")]
    Validation(String),

    /// Credential exchange failed
    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    /// No eligible resource (e.g. no open orders)
    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::MalformedMessage(e.to_string())
    }
}

impl From<RpcError> for RelayError {
    fn from(e: RpcError) -> Self {
        RelayError::Remote(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display() {
        let err = RelayError::Remote(RpcError {
            code: 10009,
            message: "not_enough_funds".to_string(),
            data: None,
        });
        assert_eq!(err.to_string(), "Remote error 10009: not_enough_funds");
    }

    #[test]
    fn test_json_error_is_malformed() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: RelayError = parse_err.into();
        assert!(matches!(err, RelayError::MalformedMessage(_)));
    }
}
