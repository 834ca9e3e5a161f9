//! Live downstream connections and payload fan-out

use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes};
use dashmap::DashMap;
use relay_core::Channel;
use relay_subscription::FanOut;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::registry::{ConnectionId, SubscriptionRegistry};

/// Outbound queue of one connection, drained by its writer task
pub type Outbound = mpsc::UnboundedSender<Message>;

#[derive(Default)]
pub struct SubscriberHub {
    next_id: AtomicU64,
    connections: DashMap<ConnectionId, Outbound>,
    registry: SubscriptionRegistry,
}

impl SubscriberHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit an authenticated connection
    pub fn register(&self, outbound: Outbound) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.connections.insert(id, outbound);
        id
    }

    /// Forget a connection; returns the channels it left without subscribers
    pub fn unregister(&self, conn: ConnectionId) -> Vec<Channel> {
        self.connections.remove(&conn);
        self.registry.drop_connection(conn)
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_connected(&self, conn: ConnectionId) -> bool {
        self.connections.contains_key(&conn)
    }

    pub fn send(&self, conn: ConnectionId, message: Message) -> bool {
        match self.connections.get(&conn) {
            Some(outbound) => outbound.send(message).is_ok(),
            None => false,
        }
    }

    /// Queue a Close frame on every connection
    pub fn close_all(&self, code: u16, reason: &str) -> usize {
        let mut closed = 0;
        for entry in self.connections.iter() {
            let frame = CloseFrame {
                code,
                reason: Utf8Bytes::from(reason),
            };
            if entry.value().send(Message::Close(Some(frame))).is_ok() {
                closed += 1;
            }
        }
        closed
    }
}

impl FanOut for SubscriberHub {
    fn fan_out(&self, channel: &Channel, data: &Value) {
        let subscribers = self.registry.subscribers(channel);
        if subscribers.is_empty() {
            tracing::debug!(channel = %channel, "No subscribers");
            return;
        }

        let payload = Utf8Bytes::from(data.to_string());
        for conn in subscribers {
            if !self.send(conn, Message::Text(payload.clone())) {
                tracing::warn!(conn, channel = %channel, "Dropping update for closed connection");
            }
        }
    }
}
