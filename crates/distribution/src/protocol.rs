//! Client → server messages

use relay_core::{Channel, ChannelSpec};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("Malformed request: {0}")]
    Malformed(String),
    #[error("Unknown method: {0}")]
    UnknownMethod(String),
    #[error("Missing instrument_name")]
    MissingInstrument,
}

/// Channel selection carried by subscribe/unsubscribe
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChannelParams {
    #[serde(default)]
    pub instrument_name: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub group: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub depth: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub interval: Option<String>,
}

impl ChannelParams {
    /// Canonical channel, defaults filled in
    pub fn to_channel(&self) -> Result<Channel, ProtocolError> {
        let instrument = self
            .instrument_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or(ProtocolError::MissingInstrument)?;

        let mut spec = ChannelSpec::new(instrument);
        spec.group = self.group.clone();
        spec.depth = self.depth.clone();
        spec.interval = self.interval.clone();
        Ok(spec.to_channel())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientRequest {
    Subscribe(Channel),
    Unsubscribe(Channel),
    Close,
}

impl ClientRequest {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        let method = value
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match method.as_str() {
            "subscribe" | "unsubscribe" => {
                let params: ChannelParams = serde_json::from_value(value)
                    .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
                let channel = params.to_channel()?;
                if method == "subscribe" {
                    Ok(ClientRequest::Subscribe(channel))
                } else {
                    Ok(ClientRequest::Unsubscribe(channel))
                }
            }
            "close" => Ok(ClientRequest::Close),
            _ => Err(ProtocolError::UnknownMethod(method)),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
