// tests/trading_cycle.rs
//
// Drives a full trading cycle against a mocked exchange: candles in,
// order out, trade recorded with brackets.
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use krakenbot::config::{default_strategies, RiskConfig, StrategyKind};
use krakenbot::domain::models::{PriceQuote, Side};
use krakenbot::exchange::KrakenClient;
use krakenbot::market_data::MarketDataCache;
use krakenbot::trading::executor::{CycleOutcome, ExecutionEngine};
use krakenbot::trading::ledger::TradeLedger;
use async_trait::async_trait;
use krakenbot::domain::errors::TradingResult;
use krakenbot::domain::models::Signal;
use krakenbot::trading::strategies::{AcceptAll, SignalValidator};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// 60 rising candles with shallow pullbacks: short SMA above long SMA
/// for a bullish trend, pullbacks keep Wilder RSI out of the
/// overbought zone.
fn uptrend_ohlc_body() -> String {
    let mut rows = Vec::new();
    for i in 0..60 {
        let close = 100.0 + i as f64 * 0.5 + if i % 2 == 1 { -2.0 } else { 0.0 };
        rows.push(json!([
            1_700_000_000 + i * 3600,
            format!("{:.2}", close - 0.1),
            format!("{:.2}", close + 0.5),
            format!("{:.2}", close - 0.5),
            format!("{:.2}", close),
            format!("{:.2}", close),
            "5.0",
            10
        ]));
    }
    json!({"error": [], "result": {"XXBTZUSD": rows, "last": 1_700_000_000}}).to_string()
}

fn engine_for(
    server_url: &str,
    ledger: Arc<TradeLedger>,
    cache: Arc<MarketDataCache>,
) -> ExecutionEngine {
    let exchange = Arc::new(
        KrakenClient::new(
            "test-key",
            &BASE64.encode(b"integration-test-secret"),
            server_url,
            RiskConfig::default(),
            ledger.clone(),
        )
        .unwrap(),
    );
    ExecutionEngine::new(
        exchange,
        cache,
        ledger,
        Arc::new(AcceptAll),
        RiskConfig::default(),
    )
}

fn trend_following() -> krakenbot::config::StrategyConfig {
    default_strategies()
        .into_iter()
        .find(|s| s.kind == StrategyKind::TrendFollowing)
        .unwrap()
}

#[tokio::test]
async fn bullish_cycle_places_a_sized_bracketed_buy() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/0/private/OHLC")
        .with_status(200)
        .with_body(uptrend_ohlc_body())
        .create_async()
        .await;
    server
        .mock("POST", "/0/private/Balance")
        .with_status(200)
        .with_body(r#"{"error":[],"result":{"ZUSD":"10000.00"}}"#)
        .create_async()
        .await;
    let add_order = server
        .mock("POST", "/0/private/AddOrder")
        .with_status(200)
        .with_body(
            r#"{"error":[],"result":{"txid":["OTESTX-AAAAA-BBBBBB"],
                "descr":{"order":"buy 1000 XBTUSD @ market"}}}"#,
        )
        .expect(1)
        .create_async()
        .await;

    let ledger = Arc::new(TradeLedger::new());
    let cache = Arc::new(MarketDataCache::new());
    cache.update_quote(PriceQuote::new("XBT/USD", dec!(50000), dec!(1)));

    let engine = engine_for(&server.url(), ledger.clone(), cache);
    let outcome = engine
        .run_cycle("XBT/USD", &trend_following())
        .await
        .unwrap();

    match outcome {
        CycleOutcome::Placed(ack) => assert_eq!(ack.order_id, "OTESTX-AAAAA-BBBBBB"),
        other => panic!("expected a placed order, got {:?}", other),
    }
    add_order.assert_async().await;

    // 10000 * 0.01 / 0.02 = 5000, capped at 10% of equity.
    let open = ledger.open_trades();
    assert_eq!(open.len(), 1);
    let trade = &open[0];
    assert_eq!(trade.side, Side::Buy);
    assert_eq!(trade.volume, dec!(1000));
    assert_eq!(trade.entry_price, dec!(50000));
    assert_eq!(trade.stop_loss, dec!(49000.00));
    assert_eq!(trade.take_profit, dec!(53000.00));
    assert_eq!(trade.leverage, 3);

    // The cycle stored its analysis for inspection.
    let analysis = engine.analysis_snapshot("trend_following", "XBT/USD").unwrap();
    assert!(analysis.rsi < 70.0);
}

#[tokio::test]
async fn cold_quote_cache_skips_the_order() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/0/private/OHLC")
        .with_status(200)
        .with_body(uptrend_ohlc_body())
        .create_async()
        .await;
    let add_order = server
        .mock("POST", "/0/private/AddOrder")
        .expect(0)
        .create_async()
        .await;

    let ledger = Arc::new(TradeLedger::new());
    let cache = Arc::new(MarketDataCache::new());

    let engine = engine_for(&server.url(), ledger.clone(), cache);
    let outcome = engine
        .run_cycle("XBT/USD", &trend_following())
        .await
        .unwrap();

    assert!(matches!(outcome, CycleOutcome::NoQuote));
    assert!(ledger.open_trades().is_empty());
    add_order.assert_async().await;
}

#[tokio::test]
async fn thin_history_skips_the_cycle() {
    let body: Value = json!({
        "error": [],
        "result": {
            "XXBTZUSD": [[1_700_000_000, "100", "101", "99", "100", "100", "5.0", 3]],
            "last": 1_700_000_000
        }
    });

    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/0/private/OHLC")
        .with_status(200)
        .with_body(body.to_string())
        .create_async()
        .await;

    let ledger = Arc::new(TradeLedger::new());
    let cache = Arc::new(MarketDataCache::new());
    cache.update_quote(PriceQuote::new("XBT/USD", dec!(50000), dec!(1)));

    let engine = engine_for(&server.url(), ledger.clone(), cache);
    let outcome = engine
        .run_cycle("XBT/USD", &trend_following())
        .await
        .unwrap();

    assert!(matches!(outcome, CycleOutcome::InsufficientData));
    assert!(ledger.open_trades().is_empty());
}

/// Validator slow enough that `stop()` lands while its cycle is still
/// in flight. Always vetoes, so no order mocks are needed.
struct SlowVeto;

#[async_trait]
impl SignalValidator for SlowVeto {
    async fn validate(&self, _signal: &Signal) -> TradingResult<bool> {
        sleep(Duration::from_millis(500)).await;
        Ok(false)
    }
}

#[tokio::test]
async fn stop_during_an_in_flight_cycle_ends_the_loop_promptly() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/0/private/OHLC")
        .with_status(200)
        .with_body(uptrend_ohlc_body())
        .create_async()
        .await;

    let ledger = Arc::new(TradeLedger::new());
    let cache = Arc::new(MarketDataCache::new());
    cache.update_quote(PriceQuote::new("XBT/USD", dec!(50000), dec!(1)));

    let exchange = Arc::new(
        KrakenClient::new(
            "test-key",
            &BASE64.encode(b"integration-test-secret"),
            &server.url(),
            RiskConfig::default(),
            ledger.clone(),
        )
        .unwrap(),
    );
    let engine = Arc::new(ExecutionEngine::new(
        exchange,
        cache,
        ledger,
        Arc::new(SlowVeto),
        RiskConfig::default(),
    ));

    // The trend_following timeframe is 60 minutes; a lost shutdown
    // notification would leave the loop sleeping that long.
    let loop_task = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run_pair("XBT/USD", &trend_following()).await })
    };

    // Let the cycle reach the validator, then stop mid-flight.
    sleep(Duration::from_millis(150)).await;
    engine.stop();

    let result = timeout(Duration::from_secs(3), loop_task)
        .await
        .expect("run_pair kept sleeping after stop()")
        .unwrap();
    assert!(result.is_ok());
}
