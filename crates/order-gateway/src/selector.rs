//! Interactive choice of the order a cancel/modify applies to

use async_trait::async_trait;

use crate::types::OpenOrder;

/// Picks one of the caller's open orders
///
/// Returning `None` aborts the operation; no mutating request is sent.
#[async_trait]
pub trait OrderSelector: Send + Sync {
    async fn select(&self, orders: &[OpenOrder]) -> Option<String>;
}

/// Selects a fixed order id if it is among the open orders
pub struct ById(pub String);

#[async_trait]
impl OrderSelector for ById {
    async fn select(&self, orders: &[OpenOrder]) -> Option<String> {
        orders
            .iter()
            .find(|order| order.order_id == self.0)
            .map(|order| order.order_id.clone())
    }
}

/// Selects the first open order
pub struct FirstOrder;

#[async_trait]
impl OrderSelector for FirstOrder {
    async fn select(&self, orders: &[OpenOrder]) -> Option<String> {
        orders.first().map(|order| order.order_id.clone())
    }
}
