//! Downstream WebSocket server

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use relay_core::Channel;
use relay_subscription::UpstreamSubscriptions;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

use crate::auth::ApiKeyStore;
use crate::config::ServerConfig;
use crate::hub::SubscriberHub;
use crate::protocol::{ClientRequest, ProtocolError};
use crate::registry::{AddOutcome, ConnectionId, RemoveOutcome};

pub const INVALID_API_KEY: &str = "Invalid API Key";
pub const CLOSED_BY_CLIENT: &str = "Closed by client request";
pub const SHUTTING_DOWN: &str = "Server shutting down";

#[derive(Debug, Deserialize)]
pub struct HandshakeParams {
    pub api_key: Option<String>,
}

pub struct DistributionServer {
    config: ServerConfig,
    hub: Arc<SubscriberHub>,
    bridge: Arc<dyn UpstreamSubscriptions>,
    api_keys: ApiKeyStore,
    shutdown: watch::Sender<bool>,
}

impl DistributionServer {
    pub fn new(
        config: ServerConfig,
        hub: Arc<SubscriberHub>,
        bridge: Arc<dyn UpstreamSubscriptions>,
    ) -> Self {
        let api_keys = ApiKeyStore::new(config.api_keys.iter().cloned());
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            hub,
            bridge,
            api_keys,
            shutdown,
        }
    }

    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .with_state(self.clone())
    }

    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        TcpListener::bind(self.config.addr()).await
    }

    /// Serve until [`DistributionServer::shutdown`] is called
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "Distribution server listening");
        }
        let mut stop = self.shutdown.subscribe();
        let app = self.router();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.wait_for(|stopped| *stopped).await;
            })
            .await
    }

    pub async fn run(self: Arc<Self>) -> std::io::Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Close every connection and stop accepting new ones
    pub fn shutdown(&self) {
        let closed = self.hub.close_all(close_code::NORMAL, SHUTTING_DOWN);
        self.shutdown.send_replace(true);
        tracing::info!(closed, "Distribution server stopping");
    }

    async fn handle_socket(self: Arc<Self>, socket: WebSocket) {
        let (mut sender, mut receiver) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let conn = self.hub.register(tx.clone());
        tracing::info!(
            conn,
            total = self.hub.connection_count(),
            "Authenticated client connected"
        );

        let send_task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if sender.send(msg).await.is_err() || closing {
                    break;
                }
            }
        });

        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if !self.handle_text(conn, text.as_str()).await {
                        let _ = tx.send(close_message(close_code::NORMAL, CLOSED_BY_CLIENT));
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(conn, error = %e, "Connection failed");
                    break;
                }
            }
        }

        self.teardown(conn).await;
        drop(tx);
        let _ = send_task.await;
        tracing::info!(
            conn,
            remaining = self.hub.connection_count(),
            "Client disconnected"
        );
    }

    /// Process one client frame; `false` when the client asked to close
    async fn handle_text(&self, conn: ConnectionId, text: &str) -> bool {
        match ClientRequest::parse(text) {
            Ok(ClientRequest::Subscribe(channel)) => self.subscribe(conn, channel).await,
            Ok(ClientRequest::Unsubscribe(channel)) => self.unsubscribe(conn, channel).await,
            Ok(ClientRequest::Close) => {
                tracing::info!(conn, "Client requested close");
                return false;
            }
            Err(ProtocolError::UnknownMethod(method)) => {
                tracing::info!(conn, method, "Unknown method");
            }
            Err(e) => tracing::warn!(conn, error = %e, "Ignoring client frame"),
        }
        true
    }

    async fn subscribe(&self, conn: ConnectionId, channel: Channel) {
        match self.hub.registry().add(conn, &channel) {
            AddOutcome::AlreadySubscribed => {
                tracing::info!(conn, channel = %channel, "Already subscribed");
            }
            AddOutcome::Joined => {
                tracing::info!(conn, channel = %channel, "Client subscribed");
            }
            AddOutcome::FirstSubscriber => {
                if self.bridge.subscribe(&channel).await {
                    tracing::info!(conn, channel = %channel, "Client subscribed");
                } else {
                    let dropped = self.hub.registry().rollback_channel(&channel);
                    tracing::error!(
                        channel = %channel,
                        dropped = dropped.len(),
                        "Upstream subscribe failed, channel rolled back"
                    );
                }
            }
        }
    }

    async fn unsubscribe(&self, conn: ConnectionId, channel: Channel) {
        match self.hub.registry().remove(conn, &channel) {
            RemoveOutcome::NotSubscribed => {
                tracing::info!(conn, channel = %channel, "Client wasn't subscribed");
            }
            RemoveOutcome::Left => {
                tracing::info!(conn, channel = %channel, "Client unsubscribed");
            }
            RemoveOutcome::LastSubscriber => {
                self.release_upstream(&channel).await;
                tracing::info!(conn, channel = %channel, "Client unsubscribed");
            }
        }
    }

    async fn teardown(&self, conn: ConnectionId) {
        for channel in self.hub.unregister(conn) {
            self.release_upstream(&channel).await;
        }
    }

    async fn release_upstream(&self, channel: &Channel) {
        if self.bridge.unsubscribe(channel).await {
            tracing::info!(channel = %channel, "No more subscribers, unsubscribed upstream");
        } else {
            tracing::warn!(channel = %channel, "Upstream unsubscribe failed");
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HandshakeParams>,
    State(server): State<Arc<DistributionServer>>,
) -> Response {
    let authorized = params
        .api_key
        .as_deref()
        .is_some_and(|key| server.api_keys.is_valid(key));

    ws.on_upgrade(move |socket| async move {
        if authorized {
            server.handle_socket(socket).await;
        } else {
            reject(socket, params.api_key).await;
        }
    })
}

async fn reject(mut socket: WebSocket, api_key: Option<String>) {
    tracing::warn!(api_key = ?api_key, "Authentication failed");
    let _ = socket
        .send(close_message(close_code::POLICY, INVALID_API_KEY))
        .await;
}

async fn health_handler(State(server): State<Arc<DistributionServer>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "connections": server.hub.connection_count(),
        "channels": server.hub.registry().channel_count(),
    }))
}

fn close_message(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}
