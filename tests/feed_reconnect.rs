// tests/feed_reconnect.rs
//
// Runs the feed against a local WebSocket server to exercise the
// subscribe handshake, the reconnect loop, and shutdown.
use futures_util::{SinkExt, StreamExt};
use krakenbot::exchange::MarketDataFeed;
use krakenbot::market_data::MarketDataCache;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

async fn accept_and_read_subscriptions(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("timed out waiting for feed connection")
        .unwrap();
    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

    let mut channels = Vec::new();
    for _ in 0..2 {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for subscribe frame")
            .unwrap()
            .unwrap();
        let frame: Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
        assert_eq!(frame["event"], "subscribe");
        assert_eq!(frame["pair"][0], "XBT/USD");
        channels.push(frame["subscription"]["name"].as_str().unwrap().to_string());
    }
    channels.sort();
    assert_eq!(channels, vec!["ticker", "trade"]);
    ws
}

async fn send_ticker(ws: &mut WebSocketStream<TcpStream>, price: &str) {
    let frame = format!(
        r#"[42,{{"c":["{}","0.01"],"v":["10.0","25.0"]}},"ticker","XBT/USD"]"#,
        price
    );
    ws.send(Message::Text(frame)).await.unwrap();
}

async fn wait_for_price(cache: &MarketDataCache, pair: &str, expected: Decimal) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if cache.last_price(pair) == Some(expected) {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!(
                "price for {} never reached {} (saw {:?})",
                pair,
                expected,
                cache.last_price(pair)
            );
        }
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn feed_resubscribes_after_disconnect_and_stops_cleanly() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let ws_url = format!("ws://{}", addr);

    let cache = Arc::new(MarketDataCache::new());
    let feed = Arc::new(
        MarketDataFeed::new(&ws_url, vec!["XBT/USD".to_string()], cache.clone())
            .with_reconnect_delay(Duration::from_millis(100)),
    );

    let feed_task = {
        let feed = feed.clone();
        tokio::spawn(async move { feed.run().await })
    };

    // First connection: handshake, one ticker, then the server drops it.
    let mut ws = accept_and_read_subscriptions(&listener).await;
    send_ticker(&mut ws, "50000.0").await;
    wait_for_price(&cache, "XBT/USD", dec!(50000.0)).await;
    drop(ws);

    // The feed must dial again and re-subscribe on its own.
    let mut ws = accept_and_read_subscriptions(&listener).await;
    send_ticker(&mut ws, "50250.5").await;
    wait_for_price(&cache, "XBT/USD", dec!(50250.5)).await;

    // Stop terminates the loop even with the connection still open.
    feed.stop();
    timeout(Duration::from_secs(5), feed_task)
        .await
        .expect("feed task did not stop")
        .unwrap();
}

#[tokio::test]
async fn feed_keeps_retrying_while_server_is_down() {
    // Reserve an address with nothing listening on it.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let cache = Arc::new(MarketDataCache::new());
    let feed = Arc::new(
        MarketDataFeed::new(
            &format!("ws://{}", addr),
            vec!["XBT/USD".to_string()],
            cache.clone(),
        )
        .with_reconnect_delay(Duration::from_millis(50)),
    );

    let feed_task = {
        let feed = feed.clone();
        tokio::spawn(async move { feed.run().await })
    };

    // Several failed dials later the loop is still alive and stoppable.
    sleep(Duration::from_millis(300)).await;
    assert!(!feed_task.is_finished());

    feed.stop();
    timeout(Duration::from_secs(5), feed_task)
        .await
        .expect("feed task did not stop")
        .unwrap();
    assert!(cache.quote("XBT/USD").is_none());
}
