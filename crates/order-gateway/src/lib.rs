//! Relay Order Gateway
//!
//! Order entry on top of the shared [`relay_transport::TransportClient`].
//! Operations are serialised by a per-gateway lock and every exchange round
//! trip is bounded by [`GatewayConfig::response_timeout`].

pub mod config;
pub mod gateway;
pub mod selector;
pub mod types;

pub use config::GatewayConfig;
pub use gateway::OrderGateway;
pub use selector::{ById, FirstOrder, OrderSelector};
pub use types::{
    BookLevel, OpenOrder, OrderAction, OrderBook, OrderTicket, OrderType, PlacedOrder, Position,
};
