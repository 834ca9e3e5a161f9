//! Order-side types exchanged with the gateway

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Limit => "limit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "market" => Some(Self::Market),
            "limit" => Some(Self::Limit),
            _ => None,
        }
    }
}

/// Buy order to place
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTicket {
    pub instrument_name: String,
    pub amount: Decimal,
    pub order_type: OrderType,
    pub label: String,
    /// Required and positive for limit orders, ignored for market orders
    pub price: Option<Decimal>,
}

impl OrderTicket {
    pub fn market(instrument_name: impl Into<String>, amount: Decimal) -> Self {
        Self {
            instrument_name: instrument_name.into(),
            amount,
            order_type: OrderType::Market,
            label: String::new(),
            price: None,
        }
    }

    pub fn limit(instrument_name: impl Into<String>, amount: Decimal, price: Decimal) -> Self {
        Self {
            instrument_name: instrument_name.into(),
            amount,
            order_type: OrderType::Limit,
            label: String::new(),
            price: Some(price),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// `private/buy` params
#[derive(Debug, Serialize)]
pub(crate) struct BuyParams<'a> {
    pub instrument_name: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub label: &'a str,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<Decimal>,
}

/// `private/edit` params
#[derive(Debug, Serialize)]
pub(crate) struct EditParams<'a> {
    pub order_id: &'a str,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub amount: Option<Decimal>,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<Decimal>,
}

/// Accepted order
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub order_id: String,
    /// Full `result` object as returned by the exchange
    pub raw: Value,
}

impl PlacedOrder {
    /// Read `order.order_id` out of a `private/buy` result
    pub fn from_result(result: Value) -> Option<Self> {
        let order_id = result
            .get("order")?
            .get("order_id")?
            .as_str()?
            .to_string();
        Some(Self {
            order_id,
            raw: result,
        })
    }
}

/// Entry of `private/get_open_orders`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OpenOrder {
    pub order_id: String,
    pub instrument_name: String,
    /// `None` for market orders (`"market_price"`)
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub price: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub order_type: Option<String>,
}

/// Entry of `private/get_positions`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Position {
    pub instrument_name: String,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub size: Option<Decimal>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub average_price: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub floating_profit_loss: Option<Decimal>,
}

/// Price level: (price, amount)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel(
    #[serde(with = "rust_decimal::serde::float")] pub Decimal,
    #[serde(with = "rust_decimal::serde::float")] pub Decimal,
);

impl BookLevel {
    pub fn price(&self) -> Decimal {
        self.0
    }

    pub fn amount(&self) -> Decimal {
        self.1
    }
}

/// `public/get_order_book` result
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderBook {
    pub instrument_name: String,
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    #[serde(default)]
    pub asks: Vec<BookLevel>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }
}

/// Outcome of an operation that needs an interactive selection
#[derive(Debug, Clone, PartialEq)]
pub enum OrderAction<T> {
    Completed(T),
    /// Selector declined; nothing was sent
    Aborted,
}

impl<T> OrderAction<T> {
    pub fn is_aborted(&self) -> bool {
        matches!(self, OrderAction::Aborted)
    }
}

fn lenient_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(decimal_from_value))
}

fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Decimal::from(i)),
            None => n.as_f64().and_then(Decimal::from_f64),
        },
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
