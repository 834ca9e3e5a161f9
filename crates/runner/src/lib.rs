//! Relay Runner
//!
//! Everything around the relay components that a deployment needs:
//!
//! - **Config**: JSON file plus `RELAY_*` environment overrides
//! - **Credentials**: refresh-token acquisition with an on-disk cache
//! - **App**: explicit construction and ordered teardown of the components
//! - **Console**: operator menu driving the order gateway
//!
//! ```text
//!  downstream clients ──ws──► DistributionServer ──► SubscriptionBridge ─┐
//!          ▲                                                            │
//!          └────────── SubscriberHub ◄── notifications ◄── TransportClient ◄──► exchange
//!                                                                 ▲
//!  operator ──stdin──► Console ──► OrderGateway ──────────────────┘
//! ```

pub mod app;
pub mod config;
pub mod console;
pub mod credentials;

pub use app::Relay;
pub use config::{ConfigError, RelayConfig};
pub use console::{Console, ConsoleSelector, Prompt};
pub use credentials::{ClientCredentialsProvider, CredentialProvider, StaticCredentials, TokenCache};
