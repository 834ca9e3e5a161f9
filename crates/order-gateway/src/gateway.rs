//! Order gateway

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use relay_core::{InboundFrame, RelayError, Result, RpcRequest, methods};
use relay_transport::{NotificationSink, TransportClient};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::config::GatewayConfig;
use crate::selector::OrderSelector;
use crate::types::{
    BuyParams, EditParams, OpenOrder, OrderAction, OrderBook, OrderTicket, OrderType,
    PlacedOrder, Position,
};

pub struct OrderGateway {
    transport: Arc<TransportClient>,
    config: GatewayConfig,
    /// Serialises gateway operations; held across the whole round trip
    op_lock: Mutex<()>,
    notifications: RwLock<Option<Arc<dyn NotificationSink>>>,
    observing: AtomicBool,
}

impl OrderGateway {
    pub fn new(transport: Arc<TransportClient>, config: GatewayConfig) -> Self {
        Self {
            transport,
            config,
            op_lock: Mutex::new(()),
            notifications: RwLock::new(None),
            observing: AtomicBool::new(false),
        }
    }

    /// Observe the transport so unsolicited frames reach the attached sink
    ///
    /// Registers at most one observer however often it is called.
    pub fn start(self: &Arc<Self>) {
        if self.observing.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = Arc::downgrade(self);
        self.transport.add_observer(Arc::new(move |frame: &str| {
            if let Some(gateway) = this.upgrade() {
                gateway.on_frame(frame);
            }
        }));
    }

    pub fn attach_notifications(&self, sink: Arc<dyn NotificationSink>) {
        *self.notifications.write() = Some(sink);
    }

    /// Place a buy order
    pub async fn place(&self, ticket: &OrderTicket) -> Result<PlacedOrder> {
        let _guard = self.op_lock.lock().await;

        let price = match ticket.order_type {
            OrderType::Limit => match ticket.price {
                Some(price) if price > Decimal::ZERO => Some(price),
                _ => {
                    tracing::warn!(instrument = %ticket.instrument_name, "Invalid price for limit order");
                    return Err(RelayError::Validation(
                        "limit order requires a positive price".to_string(),
                    ));
                }
            },
            OrderType::Market => None,
        };

        let params = BuyParams {
            instrument_name: &ticket.instrument_name,
            amount: ticket.amount,
            order_type: ticket.order_type,
            label: &ticket.label,
            price,
        };
        let result = self.call(methods::BUY, serde_json::to_value(&params)?).await?;

        let placed = PlacedOrder::from_result(result).ok_or_else(|| {
            RelayError::MalformedMessage("buy result has no order.order_id".to_string())
        })?;
        tracing::info!(order_id = %placed.order_id, instrument = %ticket.instrument_name, "Order placed");
        Ok(placed)
    }

    /// Cancel an order chosen from the open orders
    pub async fn cancel(&self, selector: &dyn OrderSelector) -> Result<OrderAction<Value>> {
        let _guard = self.op_lock.lock().await;

        let Some(order_id) = self.select_open_order(selector).await? else {
            return Ok(OrderAction::Aborted);
        };
        self.cancel_unlocked(&order_id).await.map(OrderAction::Completed)
    }

    pub async fn cancel_order(&self, order_id: &str) -> Result<Value> {
        let _guard = self.op_lock.lock().await;
        self.cancel_unlocked(order_id).await
    }

    /// Edit amount and/or price of an order chosen from the open orders
    pub async fn modify(
        &self,
        selector: &dyn OrderSelector,
        new_amount: Option<Decimal>,
        new_price: Option<Decimal>,
    ) -> Result<OrderAction<Value>> {
        let _guard = self.op_lock.lock().await;
        validate_edit(new_amount, new_price)?;

        let Some(order_id) = self.select_open_order(selector).await? else {
            return Ok(OrderAction::Aborted);
        };
        self.modify_unlocked(&order_id, new_amount, new_price)
            .await
            .map(OrderAction::Completed)
    }

    pub async fn modify_order(
        &self,
        order_id: &str,
        new_amount: Option<Decimal>,
        new_price: Option<Decimal>,
    ) -> Result<Value> {
        let _guard = self.op_lock.lock().await;
        validate_edit(new_amount, new_price)?;
        self.modify_unlocked(order_id, new_amount, new_price).await
    }

    pub async fn open_orders(&self) -> Result<Vec<OpenOrder>> {
        let _guard = self.op_lock.lock().await;
        self.open_orders_unlocked().await
    }

    pub async fn query_positions(&self, currency: &str, kind: &str) -> Result<Vec<Position>> {
        let _guard = self.op_lock.lock().await;
        let result = self
            .call(
                methods::GET_POSITIONS,
                json!({ "currency": currency, "kind": kind }),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn query_order_book(&self, instrument_name: &str, depth: u32) -> Result<OrderBook> {
        let _guard = self.op_lock.lock().await;
        let result = self
            .call(
                methods::GET_ORDER_BOOK,
                json!({ "instrument_name": instrument_name, "depth": depth }),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn select_open_order(&self, selector: &dyn OrderSelector) -> Result<Option<String>> {
        let orders = self.open_orders_unlocked().await?;
        if orders.is_empty() {
            tracing::info!("No open orders");
            return Err(RelayError::NotFound("no open orders".to_string()));
        }

        let choice = selector.select(&orders).await;
        if choice.is_none() {
            tracing::info!("Order selection aborted");
        }
        Ok(choice)
    }

    async fn open_orders_unlocked(&self) -> Result<Vec<OpenOrder>> {
        let result = self.call(methods::GET_OPEN_ORDERS, json!({})).await?;
        if !result.is_array() {
            return Err(RelayError::MalformedMessage(
                "open orders result is not an array".to_string(),
            ));
        }
        Ok(serde_json::from_value(result)?)
    }

    async fn cancel_unlocked(&self, order_id: &str) -> Result<Value> {
        let result = self
            .call(methods::CANCEL, json!({ "order_id": order_id }))
            .await?;
        tracing::info!(order_id, "Order cancelled");
        Ok(result)
    }

    async fn modify_unlocked(
        &self,
        order_id: &str,
        amount: Option<Decimal>,
        price: Option<Decimal>,
    ) -> Result<Value> {
        let params = EditParams {
            order_id,
            amount,
            price,
        };
        let result = self.call(methods::EDIT, serde_json::to_value(&params)?).await?;
        tracing::info!(order_id, "Order modified");
        Ok(result)
    }

    /// One bounded round trip; `result` on success
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let timeout = self.config.response_timeout;
        let response = self
            .transport
            .send_blocking(RpcRequest::new(method, params), timeout)
            .await?
            .ok_or(RelayError::Timeout(timeout))?;

        response.into_result().inspect_err(|e| {
            tracing::error!(method, error = %e, "Exchange request failed");
        })
    }

    fn on_frame(&self, frame: &str) {
        // Malformed frames are already logged by the transport
        let Ok(InboundFrame::Notification { method, params }) = InboundFrame::parse(frame) else {
            return;
        };
        match self.notifications.read().clone() {
            Some(sink) => sink.on_notification(&method, &params),
            None => tracing::debug!(method, "Unsolicited frame with no sink attached"),
        }
    }
}

fn validate_edit(amount: Option<Decimal>, price: Option<Decimal>) -> Result<()> {
    if amount.is_none() && price.is_none() {
        return Err(RelayError::Validation(
            "modify needs a new amount or a new price".to_string(),
        ));
    }
    Ok(())
}
