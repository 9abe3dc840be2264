//! End-to-end aggregation against a local mock feed.
//!
//! The mock upstream speaks the real wire protocol: it acknowledges
//! SUBSCRIBE/UNSUBSCRIBE frames and pushes ticker events for whichever
//! channels were requested.

use futures_util::{SinkExt, StreamExt};
use rust_decimal_macros::dec;
use std::time::Duration;
use tickfeed_agg::{AggregatorHandle, AggregatorOptions, FeedAggregator};
use tickfeed_core::Symbol;
use tickfeed_ws::{ConnectionConfig, ReconnectPolicy};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// Mock upstream: ack the first SUBSCRIBE, push `frames`, then keep
/// serving (acking any further control frames) until the client leaves.
async fn spawn_mock_feed(frames: Vec<String>) -> (String, JoinHandle<Vec<serde_json::Value>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let server = tokio::spawn(async move {
        let mut control_log = Vec::new();
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        // First SUBSCRIBE gates the tick replay.
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                let is_subscribe = value["method"] == "SUBSCRIBE";
                let ack = format!(r#"{{"result":null,"id":{}}}"#, value["id"]);
                control_log.push(value);
                ws.send(Message::Text(ack)).await.unwrap();
                if is_subscribe {
                    break;
                }
            }
        }

        for frame in frames {
            ws.send(Message::Text(frame)).await.unwrap();
        }

        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                let ack = format!(r#"{{"result":null,"id":{}}}"#, value["id"]);
                control_log.push(value);
                ws.send(Message::Text(ack)).await.unwrap();
            }
        }
        control_log
    });

    (url, server)
}

fn options(url: String) -> AggregatorOptions {
    AggregatorOptions {
        throttle_ms: 20,
        connection: ConnectionConfig {
            url,
            reconnect: ReconnectPolicy::Never,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Wait until the published table satisfies `predicate`.
async fn wait_for_table<F>(handle: &AggregatorHandle, predicate: F) -> tickfeed_core::SnapshotTable
where
    F: Fn(&tickfeed_core::SnapshotTable) -> bool,
{
    let mut rx = handle.watch();
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let table = rx.borrow_and_update().clone();
                if predicate(&table) {
                    return table;
                }
            }
            rx.changed().await.expect("aggregator gone");
        }
    })
    .await;
    result.expect("timed out waiting for published table")
}

#[tokio::test]
async fn test_ticks_flow_into_published_table() {
    let (url, _server) = spawn_mock_feed(vec![
        r#"{"e":"24hrTicker","E":1700000000000,"s":"BTCUSDT","c":"50000","P":"2.5","q":"1000"}"#
            .to_string(),
        r#"{"e":"24hrTicker","E":1700000001000,"s":"BTCUSDT","c":"50500","P":"2.6","q":"1001"}"#
            .to_string(),
        r#"{"e":"24hrTicker","E":1700000002000,"s":"BTCUSDT","c":"51000","P":"2.7","q":"1002"}"#
            .to_string(),
        r#"{"e":"24hrTicker","E":1700000003000,"s":"BTCUSDT","c":"51500","P":"2.8","q":"1003"}"#
            .to_string(),
    ])
    .await;

    let mut opts = options(url);
    opts.history_length = 3;
    let handle = FeedAggregator::spawn(Vec::new(), vec!["BTC".to_string()], opts);

    let table = wait_for_table(&handle, |table| {
        table
            .get(&Symbol::new("BTC"))
            .is_some_and(|snap| snap.price == dec!(51500))
    })
    .await;

    let btc = table.get(&Symbol::new("BTC")).unwrap();
    let history: Vec<_> = btc.history().iter().copied().collect();
    assert_eq!(history, vec![dec!(50500), dec!(51000), dec!(51500)]);
    assert_eq!(btc.change_percent, dec!(2.8));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_ack_frames_never_reach_the_table() {
    // The mock acks the subscribe before pushing any tick; the table must
    // stay empty until real data arrives.
    let (url, _server) = spawn_mock_feed(vec![
        r#"{"result":null,"id":99}"#.to_string(),
        r#"{"e":"24hrTicker","s":"ETHUSDT","c":"3000"}"#.to_string(),
    ])
    .await;

    let handle = FeedAggregator::spawn(Vec::new(), vec!["ETH".to_string()], options(url));

    let table = wait_for_table(&handle, |table| !table.is_empty()).await;
    assert_eq!(table.len(), 1);
    assert_eq!(table.get(&Symbol::new("ETH")).unwrap().price, dec!(3000));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_symbol_swap_reconciles_and_filters() {
    let (url, server) = spawn_mock_feed(vec![
        r#"{"e":"24hrTicker","s":"BTCUSDT","c":"50000"}"#.to_string(),
        r#"{"e":"24hrTicker","s":"ETHUSDT","c":"3000"}"#.to_string(),
    ])
    .await;

    let handle = FeedAggregator::spawn(
        Vec::new(),
        vec!["BTC".to_string(), "ETH".to_string()],
        options(url),
    );

    wait_for_table(&handle, |table| table.len() == 2).await;

    // Swap ETH for SOL. The ETH snapshot must leave the table even though
    // no further frame arrives.
    handle
        .set_symbols(vec!["BTC".to_string(), "SOL".to_string()])
        .await
        .unwrap();

    let table = wait_for_table(&handle, |table| !table.contains_key(&Symbol::new("ETH"))).await;
    assert!(table.contains_key(&Symbol::new("BTC")));

    handle.shutdown().await.unwrap();

    // The upstream saw the reconciliation: an UNSUBSCRIBE for ethusdt and
    // a SUBSCRIBE for solusdt, in that order.
    let control_log = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server never finished")
        .unwrap();

    let unsub_pos = control_log.iter().position(|v| {
        v["method"] == "UNSUBSCRIBE"
            && v["params"]
                .as_array()
                .is_some_and(|p| p.contains(&serde_json::json!("ethusdt@ticker")))
    });
    let sub_pos = control_log.iter().position(|v| {
        v["method"] == "SUBSCRIBE"
            && v["params"]
                .as_array()
                .is_some_and(|p| p.contains(&serde_json::json!("solusdt@ticker")))
    });

    let unsub_pos = unsub_pos.expect("no UNSUBSCRIBE for ethusdt@ticker");
    let sub_pos = sub_pos.expect("no SUBSCRIBE for solusdt@ticker");
    assert!(unsub_pos < sub_pos, "unsubscribe must precede subscribe");
}

#[tokio::test]
async fn test_shutdown_unsubscribes_before_close() {
    let (url, server) = spawn_mock_feed(vec![
        r#"{"e":"24hrTicker","s":"BTCUSDT","c":"50000"}"#.to_string(),
    ])
    .await;

    let handle = FeedAggregator::spawn(Vec::new(), vec!["BTC".to_string()], options(url));
    wait_for_table(&handle, |table| !table.is_empty()).await;

    handle.shutdown().await.unwrap();

    let control_log = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server never observed close")
        .unwrap();

    let last = control_log.last().expect("no control frames seen");
    assert_eq!(last["method"], "UNSUBSCRIBE");
    assert_eq!(last["params"][0], "btcusdt@ticker");
}
