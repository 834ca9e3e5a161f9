//! Subscription bridge against a local mock exchange
//!
//! Run with: cargo test -p relay-subscription --test bridge_integration

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use relay_core::{Channel, ChannelSpec, methods};
use relay_subscription::{FanOut, SubscriptionBridge, UpstreamSubscriptions};
use relay_transport::testing::{MockExchange, Reply};
use serde_json::{Value, json};

#[derive(Default)]
struct Collected(Mutex<Vec<(Channel, Value)>>);

impl FanOut for Collected {
    fn fan_out(&self, channel: &Channel, data: &Value) {
        self.0.lock().push((channel.clone(), data.clone()));
    }
}

impl Collected {
    async fn wait_len(&self, n: usize) -> usize {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while self.0.lock().len() < n && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.0.lock().len()
    }
}

fn btc() -> Channel {
    ChannelSpec::new("BTC-PERPETUAL").to_channel()
}

fn notification(channel: &Channel, data: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "method": "subscription",
        "params": { "channel": channel, "data": data },
    })
    .to_string()
}

async fn bridge_on(exchange: &MockExchange) -> (Arc<SubscriptionBridge>, Arc<Collected>) {
    let transport = exchange.connected_client().await.unwrap();
    let sink = Arc::new(Collected::default());
    let bridge = Arc::new(
        SubscriptionBridge::new(transport, sink.clone()).with_timeout(Duration::from_millis(300)),
    );
    bridge.start();
    (bridge, sink)
}

#[tokio::test]
async fn test_subscribe_sends_one_request_with_channel_list() {
    let exchange = MockExchange::start(|req| Reply::Result(req.params["channels"].clone())).await;
    let (bridge, _) = bridge_on(&exchange).await;

    assert!(bridge.subscribe(&btc()).await);

    let requests = exchange.requests_for(methods::SUBSCRIBE);
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].params,
        json!({ "channels": ["book.BTC-PERPETUAL.none.1.100ms"] })
    );
    assert!(bridge.is_subscribed(&btc()));
}

#[tokio::test]
async fn test_subscribe_failure_leaves_state_unchanged() {
    let exchange = MockExchange::start(|_| Reply::error(11050, "bad_request")).await;
    let (bridge, _) = bridge_on(&exchange).await;

    assert!(!bridge.subscribe(&btc()).await);
    assert!(!bridge.is_subscribed(&btc()));
}

#[tokio::test]
async fn test_subscribe_timeout_returns_false() {
    let exchange = MockExchange::start(|_| Reply::Silent).await;
    let (bridge, _) = bridge_on(&exchange).await;

    assert!(!bridge.subscribe(&btc()).await);
    assert!(bridge.subscribed_channels().is_empty());
}

#[tokio::test]
async fn test_unsubscribe_removes_only_on_success() {
    let exchange = MockExchange::start(|req| match req.method.as_str() {
        methods::UNSUBSCRIBE => Reply::error(11050, "bad_request"),
        _ => Reply::Result(json!([])),
    })
    .await;
    let (bridge, _) = bridge_on(&exchange).await;

    assert!(bridge.subscribe(&btc()).await);
    assert!(!bridge.unsubscribe(&btc()).await);
    assert!(bridge.is_subscribed(&btc()));
}

#[tokio::test]
async fn test_notifications_reach_fan_out() {
    let exchange = MockExchange::accepting().await;
    let (bridge, sink) = bridge_on(&exchange).await;
    assert!(bridge.subscribe(&btc()).await);

    exchange.push(notification(&btc(), json!({ "bids": [[50000.0, 1.0]], "asks": [] })));
    exchange.push(r#"{"jsonrpc":"2.0","method":"heartbeat","params":{"type":"heartbeat"}}"#);
    exchange.push(r#"{"jsonrpc":"2.0","method":"subscription","params":{"data":{}}}"#);

    assert_eq!(sink.wait_len(1).await, 1);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let collected = sink.0.lock().clone();
    assert_eq!(collected.len(), 1);
    assert_eq!(collected[0].0, btc());
    assert_eq!(collected[0].1["bids"][0][0], 50000.0);
}

#[tokio::test]
async fn test_stop_unsubscribes_everything_and_silences_fan_out() {
    let exchange = MockExchange::accepting().await;
    let (bridge, sink) = bridge_on(&exchange).await;
    let eth = ChannelSpec::new("ETH-PERPETUAL").depth("10").to_channel();
    assert!(bridge.subscribe(&btc()).await);
    assert!(bridge.subscribe(&eth).await);

    bridge.stop().await;

    let unsubscribed: Vec<Value> = exchange
        .requests_for(methods::UNSUBSCRIBE)
        .into_iter()
        .map(|req| req.params["channels"][0].clone())
        .collect();
    assert_eq!(unsubscribed.len(), 2);
    assert!(unsubscribed.contains(&json!(btc())));
    assert!(unsubscribed.contains(&json!(eth)));
    assert!(bridge.subscribed_channels().is_empty());
    assert!(!bridge.is_running());

    exchange.push(notification(&btc(), json!({})));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(sink.0.lock().is_empty());
}

#[tokio::test]
async fn test_stop_clears_set_even_when_exchange_is_silent() {
    let exchange = MockExchange::start(|req| match req.method.as_str() {
        methods::SUBSCRIBE => Reply::Result(json!([])),
        _ => Reply::Silent,
    })
    .await;
    let (bridge, _) = bridge_on(&exchange).await;
    assert!(bridge.subscribe(&btc()).await);

    bridge.stop().await;

    assert!(bridge.subscribed_channels().is_empty());
}

#[tokio::test]
async fn test_restart_forwards_each_notification_once() {
    let exchange = MockExchange::accepting().await;
    let (bridge, sink) = bridge_on(&exchange).await;

    bridge.stop().await;
    bridge.start();
    assert!(bridge.is_running());
    assert!(bridge.subscribe(&btc()).await);

    exchange.push(notification(&btc(), json!({ "bids": [] })));
    assert_eq!(sink.wait_len(1).await, 1);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(sink.0.lock().len(), 1);
}
