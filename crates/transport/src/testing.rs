//! In-process exchange for tests
//!
//! `MockExchange` accepts WebSocket connections on `127.0.0.1:0`, records every
//! JSON-RPC request it receives and answers through a scripted responder.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use relay_core::{Result, RpcError, RpcRequest, RpcResponse};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use crate::client::TransportClient;

/// Scripted answer for one request
#[derive(Debug, Clone)]
pub enum Reply {
    Result(Value),
    Error { code: i64, message: String },
    /// Never answer
    Silent,
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    pub fn error(code: i64, message: impl Into<String>) -> Self {
        Reply::Error {
            code,
            message: message.into(),
        }
    }

    pub fn delayed(delay: Duration, reply: Reply) -> Self {
        Reply::Delayed(delay, Box::new(reply))
    }
}

type Responder = dyn Fn(&RpcRequest) -> Reply + Send + Sync;

pub struct MockExchange {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RpcRequest>>>,
    push_tx: broadcast::Sender<String>,
}

impl MockExchange {
    /// Bind a local listener and start accepting connections
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&RpcRequest) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("mock exchange failed to bind");
        let addr = listener.local_addr().expect("mock exchange has no local address");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let (push_tx, _) = broadcast::channel(256);
        let responder: Arc<Responder> = Arc::new(responder);

        let accept_requests = requests.clone();
        let accept_push = push_tx.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                // Subscribe before the handshake so pushes sent right after
                // the client reports Connected are not lost
                let push_rx = accept_push.subscribe();
                tokio::spawn(serve_connection(
                    stream,
                    responder.clone(),
                    accept_requests.clone(),
                    push_rx,
                ));
            }
        });

        Self {
            addr,
            requests,
            push_tx,
        }
    }

    /// Answer every request with an empty object
    pub async fn accepting() -> Self {
        Self::start(|_| Reply::Result(Value::Object(Default::default()))).await
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RpcRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_for(&self, method: &str) -> Vec<RpcRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|req| req.method == method)
            .cloned()
            .collect()
    }

    /// Poll until at least `count` requests for `method` arrived (2 s bound)
    pub async fn wait_for(&self, method: &str, count: usize) -> Vec<RpcRequest> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let seen = self.requests_for(method);
            if seen.len() >= count || tokio::time::Instant::now() >= deadline {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Send a server-initiated frame to every connected client
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.push_tx.send(frame.into());
    }

    /// A client connected (not authenticated) to this exchange
    pub async fn connected_client(&self) -> Result<Arc<TransportClient>> {
        let client = Arc::new(TransportClient::new());
        client.connect(&self.url(), None);
        client.wait_connected(Duration::from_secs(5)).await?;
        Ok(client)
    }
}

async fn serve_connection(
    stream: TcpStream,
    responder: Arc<Responder>,
    requests: Arc<Mutex<Vec<RpcRequest>>>,
    mut push_rx: broadcast::Receiver<String>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(error = %e, "Mock exchange handshake failed");
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        loop {
            let text = tokio::select! {
                Some(text) = out_rx.recv() => text,
                Ok(text) = push_rx.recv() => text,
                else => break,
            };
            if write.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = read.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let request: RpcRequest = match serde_json::from_str(text.as_str()) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Mock exchange got a non-request frame");
                continue;
            }
        };
        requests.lock().push(request.clone());

        let Some(id) = request.id else {
            continue;
        };
        let reply = responder(&request);
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            if let Some(frame) = render(id, reply).await {
                let _ = out_tx.send(frame);
            }
        });
    }
}

async fn render(id: u64, mut reply: Reply) -> Option<String> {
    loop {
        match reply {
            Reply::Result(result) => return Some(RpcResponse::ok(id, result).to_value().to_string()),
            Reply::Error { code, message } => {
                let error = RpcError {
                    code,
                    message,
                    data: None,
                };
                return Some(RpcResponse::err(id, error).to_value().to_string());
            }
            Reply::Silent => return None,
            Reply::Delayed(delay, inner) => {
                tokio::time::sleep(delay).await;
                reply = *inner;
            }
        }
    }
}
