//! Relay Distribution
//!
//! Downstream WebSocket server. Clients connect with
//! `ws://<host>:<port>/?api_key=<key>`, then send
//!
//! ```json
//! {"method": "subscribe", "instrument_name": "BTC-PERPETUAL", "depth": 10}
//! {"method": "unsubscribe", "instrument_name": "BTC-PERPETUAL", "depth": 10}
//! {"method": "close"}
//! ```
//!
//! and receive the raw `data` object of every upstream notification on the
//! channels they subscribed to. The first subscriber of a channel triggers an
//! upstream subscribe, the last one leaving triggers an upstream unsubscribe.

pub mod auth;
pub mod config;
pub mod hub;
pub mod protocol;
pub mod registry;
pub mod server;

pub use auth::ApiKeyStore;
pub use config::ServerConfig;
pub use hub::SubscriberHub;
pub use protocol::{ChannelParams, ClientRequest, ProtocolError};
pub use registry::{AddOutcome, ConnectionId, RemoveOutcome, SubscriptionRegistry};
pub use server::DistributionServer;
