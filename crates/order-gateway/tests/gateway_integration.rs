//! Order gateway against a local mock exchange
//!
//! Run with: cargo test -p relay-order-gateway --test gateway_integration

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::{RelayError, methods};
use relay_order_gateway::{
    ById, FirstOrder, GatewayConfig, OpenOrder, OrderAction, OrderGateway, OrderSelector,
    OrderTicket,
};
use relay_transport::NotificationSink;
use relay_transport::testing::{MockExchange, Reply};
use rust_decimal_macros::dec;
use serde_json::{Value, json};

fn open_orders_fixture() -> Value {
    json!([
        { "order_id": "BTC-1", "instrument_name": "BTC-PERPETUAL", "price": 50000.0, "amount": 10.0 },
        { "order_id": "BTC-2", "instrument_name": "BTC-PERPETUAL", "price": 49000.0, "amount": 20.0 },
    ])
}

async fn trading_exchange() -> MockExchange {
    MockExchange::start(|req| match req.method.as_str() {
        methods::BUY => Reply::Result(json!({
            "order": { "order_id": "BTC-99", "order_state": "open" },
            "trades": [],
        })),
        methods::GET_OPEN_ORDERS => Reply::Result(open_orders_fixture()),
        methods::CANCEL => Reply::Result(json!({ "order_id": req.params["order_id"].clone(), "order_state": "cancelled" })),
        methods::EDIT => Reply::Result(json!({ "order": { "order_id": req.params["order_id"].clone() } })),
        methods::GET_POSITIONS => Reply::Result(json!([
            { "instrument_name": "BTC-PERPETUAL", "size": 100, "direction": "buy", "average_price": 50100.5 }
        ])),
        methods::GET_ORDER_BOOK => Reply::Result(json!({
            "instrument_name": req.params["instrument_name"].clone(),
            "bids": [[50000.0, 10.0]],
            "asks": [[50001.0, 3.0]],
        })),
        _ => Reply::Silent,
    })
    .await
}

async fn gateway_for(exchange: &MockExchange) -> OrderGateway {
    let transport = exchange.connected_client().await.unwrap();
    OrderGateway::new(
        transport,
        GatewayConfig::default().with_response_timeout(Duration::from_secs(2)),
    )
}

/// Never picks anything
struct Decline;

#[async_trait]
impl OrderSelector for Decline {
    async fn select(&self, _orders: &[OpenOrder]) -> Option<String> {
        None
    }
}

#[tokio::test]
async fn test_place_limit_order() {
    let exchange = trading_exchange().await;
    let gateway = gateway_for(&exchange).await;

    let ticket = OrderTicket::limit("BTC-PERPETUAL", dec!(10), dec!(50000)).with_label("t1");
    let placed = gateway.place(&ticket).await.unwrap();

    assert_eq!(placed.order_id, "BTC-99");
    let buys = exchange.requests_for(methods::BUY);
    assert_eq!(buys.len(), 1);
    assert_eq!(buys[0].params["instrument_name"], "BTC-PERPETUAL");
    assert_eq!(buys[0].params["type"], "limit");
    assert_eq!(buys[0].params["label"], "t1");
    assert_eq!(buys[0].params["price"], 50000.0);
}

#[tokio::test]
async fn test_place_market_order_sends_no_price() {
    let exchange = trading_exchange().await;
    let gateway = gateway_for(&exchange).await;

    gateway
        .place(&OrderTicket::market("ETH-PERPETUAL", dec!(1)))
        .await
        .unwrap();

    let buys = exchange.requests_for(methods::BUY);
    assert_eq!(buys[0].params["type"], "market");
    assert!(buys[0].params.get("price").is_none());
}

#[tokio::test]
async fn test_limit_price_zero_is_rejected_without_request() {
    let exchange = trading_exchange().await;
    let gateway = gateway_for(&exchange).await;

    let ticket = OrderTicket::limit("BTC-PERPETUAL", dec!(10), dec!(0));
    let result = gateway.place(&ticket).await;

    assert!(matches!(result, Err(RelayError::Validation(_))));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(exchange.requests().is_empty());
}

#[tokio::test]
async fn test_place_remote_error() {
    let exchange = MockExchange::start(|_| Reply::error(10009, "not_enough_funds")).await;
    let gateway = gateway_for(&exchange).await;

    let result = gateway
        .place(&OrderTicket::market("BTC-PERPETUAL", dec!(10)))
        .await;

    match result {
        Err(RelayError::Remote(err)) => assert_eq!(err.code, 10009),
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_place_result_without_order_id_is_malformed() {
    let exchange = MockExchange::start(|_| Reply::Result(json!({ "trades": [] }))).await;
    let gateway = gateway_for(&exchange).await;

    let result = gateway
        .place(&OrderTicket::market("BTC-PERPETUAL", dec!(10)))
        .await;

    assert!(matches!(result, Err(RelayError::MalformedMessage(_))));
}

#[tokio::test]
async fn test_gateway_wait_is_bounded() {
    let exchange = MockExchange::start(|_| Reply::Silent).await;
    let transport = exchange.connected_client().await.unwrap();
    let gateway = OrderGateway::new(
        transport.clone(),
        GatewayConfig::default().with_response_timeout(Duration::from_millis(200)),
    );

    let result = gateway.open_orders().await;

    assert!(matches!(result, Err(RelayError::Timeout(_))));
    assert_eq!(transport.pending_len(), 0);
}

#[tokio::test]
async fn test_cancel_selected_order() {
    let exchange = trading_exchange().await;
    let gateway = gateway_for(&exchange).await;

    let outcome = gateway.cancel(&ById("BTC-2".to_string())).await.unwrap();

    assert!(matches!(outcome, OrderAction::Completed(_)));
    let cancels = exchange.requests_for(methods::CANCEL);
    assert_eq!(cancels.len(), 1);
    assert_eq!(cancels[0].params["order_id"], "BTC-2");
}

#[tokio::test]
async fn test_cancel_aborted_sends_nothing() {
    let exchange = trading_exchange().await;
    let gateway = gateway_for(&exchange).await;

    let outcome = gateway.cancel(&Decline).await.unwrap();

    assert!(outcome.is_aborted());
    assert_eq!(exchange.requests_for(methods::GET_OPEN_ORDERS).len(), 1);
    assert!(exchange.requests_for(methods::CANCEL).is_empty());
}

#[tokio::test]
async fn test_cancel_with_no_open_orders() {
    let exchange = MockExchange::start(|req| match req.method.as_str() {
        methods::GET_OPEN_ORDERS => Reply::Result(json!([])),
        _ => Reply::Result(json!({})),
    })
    .await;
    let gateway = gateway_for(&exchange).await;

    let result = gateway.cancel(&FirstOrder).await;

    assert!(matches!(result, Err(RelayError::NotFound(_))));
    assert!(exchange.requests_for(methods::CANCEL).is_empty());
}

#[tokio::test]
async fn test_modify_sends_only_given_fields() {
    let exchange = trading_exchange().await;
    let gateway = gateway_for(&exchange).await;

    let outcome = gateway
        .modify(&FirstOrder, None, Some(dec!(51000)))
        .await
        .unwrap();

    assert!(matches!(outcome, OrderAction::Completed(_)));
    let edits = exchange.requests_for(methods::EDIT);
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].params["order_id"], "BTC-1");
    assert_eq!(edits[0].params["price"], 51000.0);
    assert!(edits[0].params.get("amount").is_none());
}

#[tokio::test]
async fn test_modify_without_changes_is_rejected_before_any_request() {
    let exchange = trading_exchange().await;
    let gateway = gateway_for(&exchange).await;

    let result = gateway.modify(&FirstOrder, None, None).await;

    assert!(matches!(result, Err(RelayError::Validation(_))));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(exchange.requests().is_empty());
}

#[tokio::test]
async fn test_positions_and_order_book() {
    let exchange = trading_exchange().await;
    let gateway = gateway_for(&exchange).await;

    let positions = gateway.query_positions("BTC", "future").await.unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].size, Some(dec!(100)));

    let book = gateway.query_order_book("BTC-PERPETUAL", 5).await.unwrap();
    assert_eq!(book.instrument_name, "BTC-PERPETUAL");
    assert_eq!(book.best_bid().unwrap().price(), dec!(50000));

    let requests = exchange.requests_for(methods::GET_ORDER_BOOK);
    assert_eq!(requests[0].params["depth"], 5);
    let requests = exchange.requests_for(methods::GET_POSITIONS);
    assert_eq!(requests[0].params["currency"], "BTC");
    assert_eq!(requests[0].params["kind"], "future");
}

#[tokio::test]
async fn test_concurrent_operations_are_serialised() {
    let exchange = MockExchange::start(|req| match req.method.as_str() {
        methods::GET_OPEN_ORDERS => {
            Reply::delayed(Duration::from_millis(100), Reply::Result(open_orders_fixture()))
        }
        _ => Reply::Result(json!({ "order": { "order_id": "X" } })),
    })
    .await;
    let gateway = Arc::new(gateway_for(&exchange).await);

    let first = {
        let gateway = gateway.clone();
        tokio::spawn(async move { gateway.open_orders().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    gateway
        .place(&OrderTicket::market("BTC-PERPETUAL", dec!(1)))
        .await
        .unwrap();

    assert!(first.await.unwrap().is_ok());
    let order = exchange.requests();
    assert_eq!(order[0].method, methods::GET_OPEN_ORDERS);
    assert_eq!(order[1].method, methods::BUY);
}

struct Recorder(Mutex<Vec<String>>);

impl NotificationSink for Recorder {
    fn on_notification(&self, method: &str, _params: &Value) {
        self.0.lock().push(method.to_string());
    }
}

#[tokio::test]
async fn test_unsolicited_frames_reach_attached_sink() {
    let exchange = trading_exchange().await;
    let gateway = Arc::new(gateway_for(&exchange).await);
    gateway.start();
    let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
    gateway.attach_notifications(recorder.clone());

    exchange.push(r#"{"jsonrpc":"2.0","method":"heartbeat","params":{"type":"test_request"}}"#);
    exchange.push(r#"{"jsonrpc":"2.0","id":1234,"result":{}}"#);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while recorder.0.lock().is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(*recorder.0.lock(), vec!["heartbeat".to_string()]);
}

#[tokio::test]
async fn test_repeated_start_forwards_each_frame_once() {
    let exchange = trading_exchange().await;
    let gateway = Arc::new(gateway_for(&exchange).await);
    gateway.start();
    gateway.start();
    let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
    gateway.attach_notifications(recorder.clone());

    exchange.push(r#"{"jsonrpc":"2.0","method":"heartbeat","params":{"type":"heartbeat"}}"#);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while recorder.0.lock().is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(recorder.0.lock().len(), 1);
}

#[tokio::test]
async fn test_modify_validation_waits_for_the_operation_lock() {
    let exchange = MockExchange::start(|req| match req.method.as_str() {
        methods::GET_POSITIONS => Reply::delayed(Duration::from_millis(300), Reply::Result(json!([]))),
        _ => Reply::Result(json!({})),
    })
    .await;
    let gateway = Arc::new(gateway_for(&exchange).await);

    let positions = {
        let gateway = gateway.clone();
        tokio::spawn(async move { gateway.query_positions("BTC", "future").await })
    };
    exchange.wait_for(methods::GET_POSITIONS, 1).await;

    let started = tokio::time::Instant::now();
    let result = gateway.modify_order("BTC-1", None, None).await;
    let waited = started.elapsed();

    assert!(matches!(result, Err(RelayError::Validation(_))));
    assert!(waited >= Duration::from_millis(150), "validated without the lock: {:?}", waited);
    assert!(positions.await.unwrap().is_ok());
    assert!(exchange.requests_for(methods::EDIT).is_empty());
}
