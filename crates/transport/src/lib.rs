//! Relay Transport
//!
//! One persistent WebSocket to the exchange, shared by every internal caller.
//!
//! ```text
//! caller ──send_blocking──► RequestTable(id → oneshot) ──► writer task ──► exchange
//!                                   ▲
//! exchange ──► reader task ──► dispatch_frame ──┬─► complete waiter by id
//!                                               └─► every FrameObserver (raw text)
//! ```
//!
//! Correlation ids come from one counter per client, start at 1 and are never
//! reused. A waiter that times out is removed from the table, so a late response
//! for it is reported as untracked.

pub mod client;
pub mod config;
pub mod observer;
pub mod pending;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use client::{ConnectionState, TransportClient};
pub use config::TransportConfig;
pub use observer::{FrameObserver, NotificationSink};
pub use pending::RequestTable;
