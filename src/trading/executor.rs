// src/trading/executor.rs
use crate::analysis::{self, MarketAnalysis};
use crate::config::{RiskConfig, StrategyConfig};
use crate::domain::errors::{AnalysisError, AppResult};
use crate::domain::models::{OrderAck, OrderType};
use crate::exchange::KrakenClient;
use crate::market_data::MarketDataCache;
use crate::trading::ledger::TradeLedger;
use crate::trading::risk;
use crate::trading::strategies::{self, SignalValidator};
use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

/// What one trading cycle did for a pair/strategy combination.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Not enough candle history yet for this strategy's indicators.
    InsufficientData,
    /// Analysis ran but the strategy produced no signal.
    NoSignal,
    /// A signal was produced and the validator rejected it.
    Vetoed,
    /// No live quote in the cache to use as a bracket reference.
    NoQuote,
    /// An order was accepted by the exchange.
    Placed(OrderAck),
}

/// Drives the per-pair trading loops: one `run_pair` task per
/// (pair, strategy) combination, all sharing the engine through an Arc.
pub struct ExecutionEngine {
    exchange: Arc<KrakenClient>,
    cache: Arc<MarketDataCache>,
    ledger: Arc<TradeLedger>,
    validator: Arc<dyn SignalValidator>,
    risk: RiskConfig,
    running: AtomicBool,
    // watch rather than Notify: a stop during an in-flight cycle must
    // still interrupt the sleep that follows it.
    shutdown: watch::Sender<bool>,
    last_analysis: Mutex<HashMap<String, MarketAnalysis>>,
}

impl ExecutionEngine {
    pub fn new(
        exchange: Arc<KrakenClient>,
        cache: Arc<MarketDataCache>,
        ledger: Arc<TradeLedger>,
        validator: Arc<dyn SignalValidator>,
        risk: RiskConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            exchange,
            cache,
            ledger,
            validator,
            risk,
            running: AtomicBool::new(true),
            shutdown,
            last_analysis: Mutex::new(HashMap::new()),
        }
    }

    /// Loop one pair/strategy combination at the strategy's timeframe
    /// until stopped. Skippable conditions (thin history, no quote, no
    /// signal) continue the loop; exchange and risk errors end it.
    pub async fn run_pair(&self, pair: &str, strategy: &StrategyConfig) -> AppResult<()> {
        info!(
            "Starting {} on {} (every {} min)",
            strategy.name, pair, strategy.timeframe_minutes
        );

        // Subscribed before the loop, so a stop() sent at any later
        // point makes changed() resolve immediately.
        let mut shutdown = self.shutdown.subscribe();

        while self.running.load(Ordering::SeqCst) {
            match self.run_cycle(pair, strategy).await {
                Ok(outcome) => info!("{} on {}: {:?}", strategy.name, pair, outcome),
                Err(e) => {
                    error!("{} on {} failed: {}", strategy.name, pair, e);
                    return Err(e);
                }
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sleep(Duration::from_secs(strategy.timeframe_minutes * 60)) => {}
            }
        }
        info!("Stopped {} on {}", strategy.name, pair);
        Ok(())
    }

    /// One full cycle: candles → analysis → signal → validation →
    /// sizing → order.
    pub async fn run_cycle(
        &self,
        pair: &str,
        strategy: &StrategyConfig,
    ) -> AppResult<CycleOutcome> {
        let candles = self
            .exchange
            .get_ohlc(pair, strategy.timeframe_minutes)
            .await?;

        let analysis = match analysis::analyze(strategy.kind, &candles, &strategy.indicators) {
            Ok(analysis) => analysis,
            Err(AnalysisError::InsufficientData { required, got }) => {
                warn!(
                    "{} on {}: only {} of {} candles, skipping cycle",
                    strategy.name, pair, got, required
                );
                return Ok(CycleOutcome::InsufficientData);
            }
        };

        self.last_analysis
            .lock()
            .unwrap()
            .insert(format!("{}:{}", strategy.name, pair), analysis.clone());

        let signal = match strategies::evaluate(pair, strategy, &analysis) {
            Some(signal) => signal,
            None => return Ok(CycleOutcome::NoSignal),
        };

        if !self.validator.validate(&signal).await? {
            info!("{} signal on {} vetoed by validator", strategy.name, pair);
            return Ok(CycleOutcome::Vetoed);
        }

        // Market orders still need a price for their bracket closes, so
        // a cold cache means no order this cycle.
        let reference_price = match self.cache.last_price(pair) {
            Some(price) => price,
            None => {
                warn!("No live quote for {} yet, skipping cycle", pair);
                return Ok(CycleOutcome::NoQuote);
            }
        };

        let equity = self.exchange.total_equity().await?;
        let volume = risk::size_position(
            equity,
            strategy.risk_per_trade,
            self.risk.stop_loss_pct,
            self.risk.max_position_fraction,
        )?;

        let ack = self
            .exchange
            .place_order(
                pair,
                OrderType::Market,
                signal.side,
                volume,
                reference_price,
                strategy.leverage,
            )
            .await?;

        Ok(CycleOutcome::Placed(ack))
    }

    /// Latest analysis snapshot for a strategy/pair combination.
    pub fn analysis_snapshot(&self, strategy_name: &str, pair: &str) -> Option<MarketAnalysis> {
        self.last_analysis
            .lock()
            .unwrap()
            .get(&format!("{}:{}", strategy_name, pair))
            .cloned()
    }

    pub fn ledger(&self) -> &Arc<TradeLedger> {
        &self.ledger
    }

    /// Stop all pair loops. In-flight cycles finish; no new cycle
    /// starts afterwards.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown.send(true);
    }
}
