//! Upstream WebSocket client with request/response correlation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use relay_core::{InboundFrame, RelayError, RequestId, Result, RpcRequest, RpcResponse, methods};
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::observer::FrameObserver;
use crate::pending::RequestTable;

/// Connection lifecycle as seen by callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Failed(String),
    Closed,
}

impl ConnectionState {
    fn is_settled(&self) -> bool {
        !matches!(self, ConnectionState::Idle | ConnectionState::Connecting)
    }
}

/// Shared upstream connection
///
/// Build once, wrap in `Arc`, hand clones to every component that talks to the
/// exchange. All methods take `&self` and may be called from any task.
pub struct TransportClient {
    next_id: AtomicU64,
    pending: RequestTable,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    observers: RwLock<Vec<Arc<dyn FrameObserver>>>,
    state: watch::Sender<ConnectionState>,
    credential: Mutex<Option<String>>,
}

impl Default for TransportClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportClient {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            next_id: AtomicU64::new(1),
            pending: RequestTable::new(),
            outbound: Mutex::new(None),
            observers: RwLock::new(Vec::new()),
            state,
            credential: Mutex::new(None),
        }
    }

    /// Start the handshake in the background and return immediately
    ///
    /// The credential is kept for [`TransportClient::authenticate`]. Progress
    /// is published through [`TransportClient::state`].
    pub fn connect(self: &Arc<Self>, url: &str, credential: Option<String>) {
        *self.credential.lock() = credential;
        self.state.send_replace(ConnectionState::Connecting);

        let this = Arc::downgrade(self);
        let url = url.to_string();
        tokio::spawn(async move {
            Self::run_connection(this, url).await;
        });
    }

    /// Connect, wait for the handshake, then authenticate with the credential
    ///
    /// Both waits are bounded by `timeout`.
    pub async fn connect_and_authenticate(
        self: &Arc<Self>,
        url: &str,
        credential: &str,
        timeout: Duration,
    ) -> Result<()> {
        self.connect(url, Some(credential.to_string()));
        self.wait_connected(timeout).await?;
        self.authenticate(timeout).await?;
        tracing::info!(url, "Authenticated with exchange");
        Ok(())
    }

    /// Wait until the handshake either succeeds or fails
    pub async fn wait_connected(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.state.subscribe();
        let settled = tokio::time::timeout(timeout, async {
            rx.wait_for(ConnectionState::is_settled)
                .await
                .map(|state| (*state).clone())
        })
        .await;

        match settled {
            Err(_) => {
                tracing::error!(?timeout, "Timed out waiting for exchange handshake");
                Err(RelayError::Timeout(timeout))
            }
            Ok(Err(_)) => Err(RelayError::Connection("client dropped".to_string())),
            Ok(Ok(ConnectionState::Connected)) => Ok(()),
            Ok(Ok(ConnectionState::Failed(reason))) => Err(RelayError::Connection(reason)),
            Ok(Ok(state)) => Err(RelayError::Connection(format!(
                "connection ended in state {:?}",
                state
            ))),
        }
    }

    /// Exchange the stored credential with `public/auth`
    pub async fn authenticate(&self, timeout: Duration) -> Result<()> {
        let credential = self.credential.lock().clone().unwrap_or_default();
        let request = RpcRequest::new(
            methods::AUTH,
            json!({
                "grant_type": "refresh_token",
                "refresh_token": credential,
            }),
        );

        match self.send_blocking(request, timeout).await? {
            None => {
                tracing::error!(?timeout, "Authentication timed out");
                Err(RelayError::Timeout(timeout))
            }
            Some(response) => match response.into_result() {
                Ok(_) => Ok(()),
                Err(RelayError::Remote(err)) => {
                    tracing::error!(code = err.code, message = %err.message, "Authentication failed");
                    Err(RelayError::AuthRejected(err.message))
                }
                Err(e) => Err(e),
            },
        }
    }

    /// Fire-and-forget write of a text frame
    pub fn send(&self, text: impl Into<String>) -> Result<()> {
        let outbound = self.outbound.lock();
        let tx = outbound
            .as_ref()
            .ok_or_else(|| RelayError::Connection("not connected".to_string()))?;
        let text: String = text.into();
        tx.send(Message::Text(text.into()))
            .map_err(|_| RelayError::Connection("writer closed".to_string()))
    }

    /// Send a request and wait up to `timeout` for the response with its id
    ///
    /// `Ok(None)` means the wait expired. The Request Table entry is gone when
    /// this returns, whatever the outcome. A caller-supplied id that is already
    /// in flight is refused with `RelayError::Validation`.
    pub async fn send_blocking(
        &self,
        mut request: RpcRequest,
        timeout: Duration,
    ) -> Result<Option<RpcResponse>> {
        let (id, rx) = match request.id {
            Some(id) => match self.pending.register(id) {
                Some(rx) => (id, rx),
                None => {
                    tracing::warn!(id, method = %request.method, "Request id already in flight");
                    return Err(RelayError::Validation(format!(
                        "duplicate request id {}",
                        id
                    )));
                }
            },
            // Skip ids a caller has claimed explicitly
            None => loop {
                let id = self.next_id();
                if let Some(rx) = self.pending.register(id) {
                    request.id = Some(id);
                    break (id, rx);
                }
            },
        };

        let sent = request.to_json().and_then(|text| self.send(text));
        if let Err(e) = sent {
            self.pending.remove(id);
            return Err(e);
        }

        let outcome = tokio::time::timeout(timeout, rx).await;
        self.pending.remove(id);

        match outcome {
            Ok(Ok(response)) => Ok(Some(response)),
            Ok(Err(_)) => Ok(None),
            Err(_) => {
                tracing::warn!(id, method = %request.method, ?timeout, "Request timed out");
                Ok(None)
            }
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn FrameObserver>) {
        self.observers.write().push(observer);
    }

    /// Route one inbound frame: complete its waiter, then notify every observer
    pub fn dispatch_frame(&self, text: &str) {
        match InboundFrame::parse(text) {
            Ok(InboundFrame::Response(response)) => {
                let id = response.id;
                if !self.pending.complete(response) {
                    tracing::warn!(id, "Response for untracked request id");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Dropping malformed frame"),
        }

        let observers = self.observers.read().clone();
        for observer in observers {
            observer.on_frame(text);
        }
    }

    /// Send a normal Close frame and mark the client disconnected
    pub fn close(&self) {
        if let Some(tx) = self.outbound.lock().take() {
            let _ = tx.send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            })));
        }
        self.state.send_replace(ConnectionState::Closed);
    }

    pub fn next_id(&self) -> RequestId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_connected(&self) -> bool {
        *self.state.borrow() == ConnectionState::Connected
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    async fn run_connection(this: Weak<Self>, url: String) {
        let ws_stream = match connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Exchange handshake failed");
                if let Some(client) = this.upgrade() {
                    client.state.send_replace(ConnectionState::Failed(e.to_string()));
                }
                return;
            }
        };
        let (mut write, mut read) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        match this.upgrade() {
            Some(client) => {
                *client.outbound.lock() = Some(tx);
                client.state.send_replace(ConnectionState::Connected);
            }
            None => return,
        }
        tracing::info!(url = %url, "Connected to exchange");

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = write.send(msg).await {
                    tracing::warn!(error = %e, "Write to exchange failed");
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = write.close().await;
        });

        while let Some(msg) = read.next().await {
            let Some(client) = this.upgrade() else {
                break;
            };
            match msg {
                Ok(Message::Text(text)) => client.dispatch_frame(text.as_str()),
                Ok(Message::Close(frame)) => {
                    tracing::info!(?frame, "Exchange closed the connection");
                    break;
                }
                Ok(Message::Ping(data)) => {
                    tracing::trace!("Received ping: {:?}", data);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Exchange connection error");
                    break;
                }
            }
        }

        if let Some(client) = this.upgrade() {
            client.outbound.lock().take();
            client.state.send_if_modified(|state| {
                if *state == ConnectionState::Connected {
                    *state = ConnectionState::Closed;
                    true
                } else {
                    false
                }
            });
            tracing::info!(pending = client.pending_len(), "Exchange connection ended");
        }
    }
}
