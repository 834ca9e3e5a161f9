//! JSON-RPC 2.0 wire types for the upstream exchange connection
//!
//! - Request: `{"jsonrpc":"2.0","id":7,"method":"private/buy","params":{...}}`
//! - Response: same `id` plus either `result` or `error`
//! - Notification (no `id`): `{"method":"subscription","params":{"channel":..,"data":..}}`

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::channel::Channel;
use crate::error::{RelayError, Result};

/// Correlation id linking a request to its response on a shared transport
pub type RequestId = u64;

pub const JSONRPC_VERSION: &str = "2.0";

/// Exchange method names
pub mod methods {
    pub const AUTH: &str = "public/auth";
    pub const BUY: &str = "private/buy";
    pub const CANCEL: &str = "private/cancel";
    pub const EDIT: &str = "private/edit";
    pub const GET_POSITIONS: &str = "private/get_positions";
    pub const GET_OPEN_ORDERS: &str = "private/get_open_orders";
    pub const GET_ORDER_BOOK: &str = "public/get_order_book";
    pub const SUBSCRIBE: &str = "private/subscribe";
    pub const UNSUBSCRIBE: &str = "private/unsubscribe";

    /// Method carried by market-data notifications
    pub const SUBSCRIPTION: &str = "subscription";
}

/// Outbound request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    /// Assigned by the transport when left empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }

    pub fn with_id(mut self, id: RequestId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Error object returned by the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Correlated response
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    pub id: RequestId,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn ok(id: RequestId, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: RequestId, error: RpcError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// `result` on success, [`RelayError::Remote`] when the exchange returned an error
    pub fn into_result(self) -> Result<Value> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(RelayError::Remote(error)),
            (Some(result), None) => Ok(result),
            (None, None) => Err(RelayError::MalformedMessage(format!(
                "response {} has neither result nor error",
                self.id
            ))),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut value = json!({ "jsonrpc": JSONRPC_VERSION, "id": self.id });
        if let Some(result) = &self.result {
            value["result"] = result.clone();
        }
        if let Some(error) = &self.error {
            value["error"] = json!(error);
        }
        value
    }

    fn from_value(id: RequestId, value: &Value) -> Result<Self> {
        let error = match value.get("error") {
            Some(raw) => Some(serde_json::from_value::<RpcError>(raw.clone())?),
            None => None,
        };
        Ok(Self {
            id,
            result: value.get("result").cloned(),
            error,
        })
    }
}

/// Classified inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Carries an integer `id`
    Response(RpcResponse),
    /// No `id`, has a `method`
    Notification { method: String, params: Value },
    /// Valid JSON that is neither (heartbeat echoes, string ids, ...)
    Other(Value),
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        if let Some(id) = value.get("id") {
            return match id.as_u64() {
                Some(id) => Ok(InboundFrame::Response(RpcResponse::from_value(id, &value)?)),
                None => Ok(InboundFrame::Other(value)),
            };
        }

        match value.get("method").and_then(Value::as_str) {
            Some(method) => Ok(InboundFrame::Notification {
                method: method.to_string(),
                params: value.get("params").cloned().unwrap_or(Value::Null),
            }),
            None => Ok(InboundFrame::Other(value)),
        }
    }

    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            InboundFrame::Response(response) => Some(response.id),
            _ => None,
        }
    }
}

/// Market-data notification: `params.channel` + `params.data`
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionNotification {
    pub channel: Channel,
    pub data: Value,
}

impl SubscriptionNotification {
    /// `None` for frames that are not subscription notifications
    pub fn from_frame(frame: &InboundFrame) -> Option<Self> {
        let InboundFrame::Notification { method, params } = frame else {
            return None;
        };
        if method != methods::SUBSCRIPTION {
            return None;
        }
        let channel = params.get("channel")?.as_str()?;
        let data = params.get("data")?;
        Some(Self {
            channel: Channel::new(channel),
            data: data.clone(),
        })
    }
}
