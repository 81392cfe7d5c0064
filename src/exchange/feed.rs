// src/exchange/feed.rs
use crate::domain::errors::{FeedError, FeedResult};
use crate::domain::models::PriceQuote;
use crate::market_data::MarketDataCache;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Live market-data feed. Subscribes to ticker and trade channels for
/// the configured pairs and writes every observation into the shared
/// cache. Connection loss is always recoverable: the feed waits out the
/// reconnect delay and dials again until `stop` is called.
pub struct MarketDataFeed {
    ws_url: String,
    pairs: Vec<String>,
    cache: Arc<MarketDataCache>,
    reconnect_delay: Duration,
    running: AtomicBool,
    shutdown: Notify,
}

impl MarketDataFeed {
    pub fn new(ws_url: &str, pairs: Vec<String>, cache: Arc<MarketDataCache>) -> Self {
        Self {
            ws_url: ws_url.to_string(),
            pairs,
            cache,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Run the feed until `stop` is called. Never returns on feed
    /// errors; they only trigger a reconnect.
    pub async fn run(&self) {
        self.running.store(true, Ordering::SeqCst);
        info!("Starting market data feed for {:?}", self.pairs);

        while self.running.load(Ordering::SeqCst) {
            if let Err(e) = self.connect_and_stream().await {
                warn!(
                    "Feed disconnected: {}. Reconnecting in {:?}",
                    e, self.reconnect_delay
                );
            }
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = sleep(self.reconnect_delay) => {}
            }
        }
        info!("Market data feed stopped");
    }

    /// Request the feed loop to exit. Takes effect immediately when the
    /// loop is waiting, or on the next message otherwise.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_waiters();
        self.shutdown.notify_one();
    }

    async fn connect_and_stream(&self) -> FeedResult<()> {
        let (stream, _) = connect_async(&self.ws_url)
            .await
            .map_err(|e| FeedError::Connection(e.to_string()))?;
        info!("Feed connected to {}", self.ws_url);

        let (mut write, mut read) = stream.split();

        for channel in ["ticker", "trade"] {
            let subscribe = json!({
                "event": "subscribe",
                "pair": self.pairs,
                "subscription": { "name": channel }
            });
            write
                .send(Message::Text(subscribe.to_string()))
                .await
                .map_err(|e| FeedError::Connection(e.to_string()))?;
        }

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => return Ok(()),
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.dispatch(&text),
                    Some(Ok(Message::Ping(payload))) => {
                        write
                            .send(Message::Pong(payload))
                            .await
                            .map_err(|e| FeedError::Connection(e.to_string()))?;
                    }
                    Some(Ok(Message::Close(_))) | None => return Err(FeedError::Closed),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(FeedError::Connection(e.to_string())),
                }
            }
        }
    }

    /// Route one feed frame. Event objects (subscription status,
    /// heartbeats) are logged and dropped; data frames are
    /// `[channelId, payload, channelName, pair]` arrays. Frames we
    /// cannot parse are dropped, never fatal.
    fn dispatch(&self, text: &str) {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                debug!("Dropping unparseable feed frame: {}", e);
                return;
            }
        };

        if value.get("event").is_some() {
            debug!("Feed event: {}", value);
            return;
        }

        let frame = match value.as_array() {
            Some(frame) if frame.len() >= 4 => frame,
            _ => {
                debug!("Dropping malformed feed frame: {}", value);
                return;
            }
        };

        let channel = frame[2].as_str().unwrap_or_default();
        let pair = frame[3].as_str().unwrap_or_default();
        if pair.is_empty() {
            debug!("Dropping feed frame without pair: {}", value);
            return;
        }

        if channel == "ticker" {
            self.handle_ticker(pair, &frame[1]);
        } else if channel.starts_with("trade") {
            self.handle_trades(pair, &frame[1]);
        }
    }

    /// Ticker payload: `c` is [last price, lot volume], `v` is
    /// [volume today, volume 24h].
    fn handle_ticker(&self, pair: &str, payload: &Value) {
        let price = decimal_field(payload, "c", 0);
        let volume = decimal_field(payload, "v", 1);
        match (price, volume) {
            (Some(price), Some(volume)) => {
                self.cache.update_quote(PriceQuote::new(pair, price, volume));
            }
            _ => debug!("Dropping ticker with missing fields for {}", pair),
        }
    }

    /// Trade payload: array of [price, volume, time, side, ordertype, misc].
    fn handle_trades(&self, pair: &str, payload: &Value) {
        let trades = match payload.as_array() {
            Some(trades) => trades,
            None => return,
        };
        for trade in trades {
            if let Some(price) = trade
                .get(0)
                .and_then(|v| v.as_str())
                .and_then(|s| Decimal::from_str(s).ok())
            {
                self.cache.apply_trade(pair, price);
            }
        }
    }
}

fn decimal_field(payload: &Value, key: &str, index: usize) -> Option<Decimal> {
    payload
        .get(key)?
        .get(index)?
        .as_str()
        .and_then(|s| Decimal::from_str(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn feed_with_cache() -> (MarketDataFeed, Arc<MarketDataCache>) {
        let cache = Arc::new(MarketDataCache::new());
        let feed = MarketDataFeed::new(
            "wss://ws.kraken.com",
            vec!["XBT/USD".to_string()],
            cache.clone(),
        );
        (feed, cache)
    }

    #[test]
    fn ticker_frame_updates_the_cache() {
        let (feed, cache) = feed_with_cache();
        feed.dispatch(
            r#"[42,{"c":["50123.4","0.01"],"v":["120.5","340.1"]},"ticker","XBT/USD"]"#,
        );
        let quote = cache.quote("XBT/USD").unwrap();
        assert_eq!(quote.last_price, dec!(50123.4));
        assert_eq!(quote.last_volume, dec!(340.1));
    }

    #[test]
    fn trade_frames_apply_in_order() {
        let (feed, cache) = feed_with_cache();
        feed.dispatch(
            r#"[42,[["50000.0","0.1","1680000000.1","b","m",""],
                    ["50010.0","0.2","1680000000.2","s","l",""]],"trade","XBT/USD"]"#,
        );
        assert_eq!(cache.last_price("XBT/USD"), Some(dec!(50010.0)));
    }

    #[test]
    fn event_and_malformed_frames_are_dropped() {
        let (feed, cache) = feed_with_cache();
        feed.dispatch(r#"{"event":"heartbeat"}"#);
        feed.dispatch(r#"{"event":"subscriptionStatus","status":"subscribed"}"#);
        feed.dispatch("not json at all");
        feed.dispatch(r#"[42,{"c":["bad-price","0"]},"ticker","XBT/USD"]"#);
        feed.dispatch(r#"[42]"#);
        assert!(cache.quote("XBT/USD").is_none());
    }

    #[test]
    fn ticker_with_missing_volume_is_dropped() {
        let (feed, cache) = feed_with_cache();
        feed.dispatch(r#"[42,{"c":["50123.4","0.01"]},"ticker","XBT/USD"]"#);
        assert!(cache.quote("XBT/USD").is_none());
    }
}
