//! Subscription bridge

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::{
    Channel, InboundFrame, RelayError, Result, RpcRequest, SubscriptionNotification, methods,
};
use relay_transport::{NotificationSink, TransportClient};
use serde_json::{Value, json};

use crate::ports::{FanOut, UpstreamSubscriptions};

pub const DEFAULT_SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maps channel interest onto `private/subscribe` / `private/unsubscribe`
/// and forwards matching notifications to a [`FanOut`] sink
pub struct SubscriptionBridge {
    transport: Arc<TransportClient>,
    sink: Arc<dyn FanOut>,
    /// Channels the exchange has acknowledged
    subscribed: Mutex<HashSet<Channel>>,
    running: AtomicBool,
    /// Set once the transport observer is registered
    observing: AtomicBool,
    timeout: Duration,
}

impl SubscriptionBridge {
    pub fn new(transport: Arc<TransportClient>, sink: Arc<dyn FanOut>) -> Self {
        Self {
            transport,
            sink,
            subscribed: Mutex::new(HashSet::new()),
            running: AtomicBool::new(false),
            observing: AtomicBool::new(false),
            timeout: DEFAULT_SUBSCRIBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Observe the transport and start forwarding notifications
    ///
    /// The observer holds a weak reference, so dropping the bridge detaches it.
    /// It is registered once; a restart after [`SubscriptionBridge::stop`] only
    /// resumes forwarding.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        if !self.observing.swap(true, Ordering::SeqCst) {
            let this = Arc::downgrade(self);
            self.transport.add_observer(Arc::new(move |frame: &str| {
                if let Some(bridge) = this.upgrade() {
                    bridge.on_frame(frame);
                }
            }));
        }
        tracing::info!("Subscription bridge started");
    }

    /// Stop forwarding and release every upstream subscription
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);

        let channels: Vec<Channel> = self.subscribed.lock().iter().cloned().collect();
        for channel in &channels {
            if let Err(e) = self.request(methods::UNSUBSCRIBE, channel).await {
                tracing::warn!(channel = %channel, error = %e, "Unsubscribe during stop failed");
            }
        }
        self.subscribed.lock().clear();
        tracing::info!(released = channels.len(), "Subscription bridge stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_subscribed(&self, channel: &Channel) -> bool {
        self.subscribed.lock().contains(channel)
    }

    pub fn subscribed_channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.subscribed.lock().iter().cloned().collect();
        channels.sort();
        channels
    }

    /// Raw inbound frame from the transport
    pub fn on_frame(&self, frame: &str) {
        match InboundFrame::parse(frame) {
            Ok(InboundFrame::Notification { method, params }) => {
                self.on_notification(&method, &params)
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "Ignoring unparsable frame"),
        }
    }

    /// Forward a `subscription` notification to the fan-out sink
    pub fn on_notification(&self, method: &str, params: &Value) {
        if !self.is_running() || method != methods::SUBSCRIPTION {
            return;
        }
        let frame = InboundFrame::Notification {
            method: method.to_string(),
            params: params.clone(),
        };
        match SubscriptionNotification::from_frame(&frame) {
            Some(note) => self.sink.fan_out(&note.channel, &note.data),
            None => tracing::warn!(%params, "Subscription notification without channel or data"),
        }
    }

    async fn request(&self, method: &str, channel: &Channel) -> Result<Value> {
        let request = RpcRequest::new(method, json!({ "channels": [channel] }));
        self.transport
            .send_blocking(request, self.timeout)
            .await?
            .ok_or(RelayError::Timeout(self.timeout))?
            .into_result()
    }
}

#[async_trait]
impl UpstreamSubscriptions for SubscriptionBridge {
    async fn subscribe(&self, channel: &Channel) -> bool {
        match self.request(methods::SUBSCRIBE, channel).await {
            Ok(_) => {
                self.subscribed.lock().insert(channel.clone());
                tracing::info!(channel = %channel, "Subscribed upstream");
                true
            }
            Err(e) => {
                tracing::error!(channel = %channel, error = %e, "Upstream subscribe failed");
                false
            }
        }
    }

    async fn unsubscribe(&self, channel: &Channel) -> bool {
        match self.request(methods::UNSUBSCRIBE, channel).await {
            Ok(_) => {
                self.subscribed.lock().remove(channel);
                tracing::info!(channel = %channel, "Unsubscribed upstream");
                true
            }
            Err(e) => {
                tracing::error!(channel = %channel, error = %e, "Upstream unsubscribe failed");
                false
            }
        }
    }
}

impl NotificationSink for SubscriptionBridge {
    fn on_notification(&self, method: &str, params: &Value) {
        SubscriptionBridge::on_notification(self, method, params)
    }
}
