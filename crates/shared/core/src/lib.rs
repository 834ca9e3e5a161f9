//! Relay Core
//!
//! Shared kernel for the exchange relay. Contains no async and no I/O:
//!
//! - JSON-RPC 2.0 wire types used on the upstream exchange connection
//! - Canonical market-data [`Channel`] keys shared by upstream and downstream
//! - The [`RelayError`] taxonomy every component reports through

pub mod channel;
pub mod error;
pub mod rpc;

pub use channel::{Channel, ChannelSpec};
pub use error::{RelayError, Result};
pub use rpc::{
    InboundFrame, RequestId, RpcError, RpcRequest, RpcResponse, SubscriptionNotification,
    methods,
};
