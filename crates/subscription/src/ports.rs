//! Seams between the bridge and its neighbours

use async_trait::async_trait;
use relay_core::Channel;
use serde_json::Value;

/// Upstream subscription control
///
/// `true` only when the exchange acknowledged the request.
#[async_trait]
pub trait UpstreamSubscriptions: Send + Sync {
    async fn subscribe(&self, channel: &Channel) -> bool;
    async fn unsubscribe(&self, channel: &Channel) -> bool;
}

/// Receives `(channel, data)` for every subscription notification
///
/// Called on the transport's reader task; must not block.
pub trait FanOut: Send + Sync {
    fn fan_out(&self, channel: &Channel, data: &Value);
}

impl<F> FanOut for F
where
    F: Fn(&Channel, &Value) + Send + Sync,
{
    fn fan_out(&self, channel: &Channel, data: &Value) {
        self(channel, data)
    }
}
