// src/main.rs
use krakenbot::config::Config;
use krakenbot::domain::errors::AppResult;
use krakenbot::exchange::{KrakenClient, MarketDataFeed};
use krakenbot::market_data::MarketDataCache;
use krakenbot::trading::executor::ExecutionEngine;
use krakenbot::trading::ledger::TradeLedger;
use krakenbot::trading::performance::{JsonFileStore, PerformanceTracker};
use krakenbot::trading::strategies::AcceptAll;

use std::sync::Arc;
use tokio::signal::ctrl_c;

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    config.init_logging()?;

    log::info!("Starting krakenbot v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Trading pairs: {:?}", config.trading.pairs);

    let ledger = Arc::new(TradeLedger::new());
    let exchange = Arc::new(KrakenClient::new(
        &config.exchange.api_key,
        &config.exchange.api_secret,
        &config.exchange.base_url,
        config.risk.clone(),
        ledger.clone(),
    )?);

    // Verify credentials and report equity before anything trades.
    log::info!("Checking account...");
    let equity = exchange.total_equity().await?;
    log::info!("Account equity: {}", equity);

    // Live market data feed into the shared cache
    let cache = Arc::new(MarketDataCache::new());
    let feed = Arc::new(MarketDataFeed::new(
        &config.exchange.ws_url,
        config.trading.pairs.clone(),
        cache.clone(),
    ));
    let feed_task = {
        let feed = feed.clone();
        tokio::spawn(async move { feed.run().await })
    };

    // One trading loop per (pair, strategy) combination
    let engine = Arc::new(ExecutionEngine::new(
        exchange.clone(),
        cache.clone(),
        ledger.clone(),
        Arc::new(AcceptAll),
        config.risk.clone(),
    ));
    let mut trading_tasks = Vec::new();
    for pair in &config.trading.pairs {
        for strategy in &config.trading.strategies {
            let engine = engine.clone();
            let pair = pair.clone();
            let strategy = strategy.clone();
            trading_tasks.push(tokio::spawn(async move {
                if let Err(e) = engine.run_pair(&pair, &strategy).await {
                    log::error!("Trading loop for {} exited: {}", pair, e);
                }
            }));
        }
    }

    // Performance tracking, seeded from the previous session's snapshot
    let tracker = Arc::new(PerformanceTracker::new(
        exchange.clone(),
        cache.clone(),
        ledger.clone(),
        Box::new(JsonFileStore::new(&config.trading.metrics_path)),
    )?);
    let tracker_task = {
        let tracker = tracker.clone();
        tokio::spawn(async move { tracker.run().await })
    };

    log::info!("Bot running. Press Ctrl+C to stop.");
    ctrl_c().await?;
    log::info!("Shutdown requested");

    engine.stop();
    feed.stop();
    tracker.stop();

    for task in trading_tasks {
        let _ = task.await;
    }
    let _ = feed_task.await;
    let _ = tracker_task.await;

    // Final snapshot so the next session resumes where this one ended.
    tracker.persist()?;
    log::info!("Shutdown complete");

    Ok(())
}
