//! Relay Subscription
//!
//! Bridges downstream interest in market-data channels to the exchange:
//!
//! - [`UpstreamSubscriptions`] is what the distribution server calls on the
//!   first-subscriber / last-subscriber transitions of a channel
//! - [`FanOut`] is where notifications for subscribed channels are delivered
//!
//! Ownership runs one way: server → bridge → fan-out sink.

pub mod bridge;
pub mod ports;

pub use bridge::{DEFAULT_SUBSCRIBE_TIMEOUT, SubscriptionBridge};
pub use ports::{FanOut, UpstreamSubscriptions};
