//! Market-data channel keys
//!
//! A channel is the unit of both upstream subscription and downstream fan-out.
//! Order book channels use the canonical form
//! `book.<instrument>.<group>.<depth>.<interval>`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical channel key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(String);

impl Channel {
    /// Default price grouping
    pub const DEFAULT_GROUP: &'static str = "none";
    /// Default number of levels
    pub const DEFAULT_DEPTH: &'static str = "1";
    /// Default notification interval
    pub const DEFAULT_INTERVAL: &'static str = "100ms";

    /// Wrap an already-canonical channel name (e.g. one received from the exchange)
    pub fn new(name: impl Into<String>) -> Self {
        Channel(name.into())
    }

    /// Order book channel: `book.BTC-PERPETUAL.none.1.100ms`
    pub fn book(instrument: &str, group: &str, depth: &str, interval: &str) -> Self {
        Channel(format!("book.{}.{}.{}.{}", instrument, group, depth, interval))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Channel {
    fn from(name: &str) -> Self {
        Channel::new(name)
    }
}

impl AsRef<str> for Channel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Order book channel parameters before canonicalisation
///
/// Missing parameters fall back to [`Channel::DEFAULT_GROUP`],
/// [`Channel::DEFAULT_DEPTH`] and [`Channel::DEFAULT_INTERVAL`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSpec {
    pub instrument: String,
    pub group: Option<String>,
    pub depth: Option<String>,
    pub interval: Option<String>,
}

impl ChannelSpec {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            ..Default::default()
        }
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn depth(mut self, depth: impl Into<String>) -> Self {
        self.depth = Some(depth.into());
        self
    }

    pub fn interval(mut self, interval: impl Into<String>) -> Self {
        self.interval = Some(interval.into());
        self
    }

    pub fn to_channel(&self) -> Channel {
        Channel::book(
            &self.instrument,
            self.group.as_deref().unwrap_or(Channel::DEFAULT_GROUP),
            self.depth.as_deref().unwrap_or(Channel::DEFAULT_DEPTH),
            self.interval.as_deref().unwrap_or(Channel::DEFAULT_INTERVAL),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let channel = ChannelSpec::new("BTC-PERPETUAL").to_channel();
        assert_eq!(channel.as_str(), "book.BTC-PERPETUAL.none.1.100ms");
    }

    #[test]
    fn test_explicit_parameters() {
        let channel = ChannelSpec::new("ETH-PERPETUAL")
            .group("5")
            .depth("10")
            .interval("raw")
            .to_channel();
        assert_eq!(channel.to_string(), "book.ETH-PERPETUAL.5.10.raw");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let channel = Channel::from("book.BTC-PERPETUAL.none.1.100ms");
        let json = serde_json::to_string(&channel).unwrap();
        assert_eq!(json, "\"book.BTC-PERPETUAL.none.1.100ms\"");
    }
}
