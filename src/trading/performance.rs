// src/trading/performance.rs
use crate::domain::errors::AppResult;
use crate::exchange::KrakenClient;
use crate::market_data::MarketDataCache;
use crate::trading::ledger::TradeLedger;
use log::{info, warn};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

/// Session performance counters. Equity observations feed the running
/// peak/drawdown figures; trade counters come from the ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerformanceMetrics {
    pub total_trades: usize,
    pub open_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub realized_pnl: Decimal,
    pub best_trade: Decimal,
    pub worst_trade: Decimal,
    pub current_equity: Decimal,
    pub peak_equity: Decimal,
    pub current_drawdown: Decimal,
    pub max_drawdown: Decimal,
}

impl PerformanceMetrics {
    /// Winning trades as a percentage of all recorded trades; 0 when
    /// nothing has traded yet.
    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.winning_trades as f64 / self.total_trades as f64 * 100.0
    }

    /// Fold in a fresh equity reading, updating peak and drawdown.
    pub fn observe_equity(&mut self, equity: Decimal) {
        self.current_equity = equity;
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
        self.current_drawdown = if self.peak_equity > Decimal::ZERO {
            (self.peak_equity - equity) / self.peak_equity
        } else {
            Decimal::ZERO
        };
        if self.current_drawdown > self.max_drawdown {
            self.max_drawdown = self.current_drawdown;
        }
    }

    /// Flatten to the string map the snapshot store persists.
    pub fn to_snapshot(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("total_trades".to_string(), self.total_trades.to_string());
        map.insert("open_trades".to_string(), self.open_trades.to_string());
        map.insert("winning_trades".to_string(), self.winning_trades.to_string());
        map.insert("losing_trades".to_string(), self.losing_trades.to_string());
        map.insert("realized_pnl".to_string(), self.realized_pnl.to_string());
        map.insert("best_trade".to_string(), self.best_trade.to_string());
        map.insert("worst_trade".to_string(), self.worst_trade.to_string());
        map.insert("current_equity".to_string(), self.current_equity.to_string());
        map.insert("peak_equity".to_string(), self.peak_equity.to_string());
        map.insert(
            "current_drawdown".to_string(),
            self.current_drawdown.to_string(),
        );
        map.insert("max_drawdown".to_string(), self.max_drawdown.to_string());
        map
    }

    /// Rebuild from a snapshot map. Missing or malformed fields fall
    /// back to zero so a hand-edited file cannot prevent startup.
    pub fn from_snapshot(map: &HashMap<String, String>) -> Self {
        let count = |key: &str| -> usize {
            map.get(key).and_then(|v| v.parse().ok()).unwrap_or(0)
        };
        let decimal = |key: &str| -> Decimal {
            map.get(key)
                .and_then(|v| Decimal::from_str(v).ok())
                .unwrap_or(Decimal::ZERO)
        };
        Self {
            total_trades: count("total_trades"),
            open_trades: count("open_trades"),
            winning_trades: count("winning_trades"),
            losing_trades: count("losing_trades"),
            realized_pnl: decimal("realized_pnl"),
            best_trade: decimal("best_trade"),
            worst_trade: decimal("worst_trade"),
            current_equity: decimal("current_equity"),
            peak_equity: decimal("peak_equity"),
            current_drawdown: decimal("current_drawdown"),
            max_drawdown: decimal("max_drawdown"),
        }
    }
}

/// Persistence seam for the metrics snapshot.
pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> AppResult<Option<HashMap<String, String>>>;
    fn save(&self, snapshot: &HashMap<String, String>) -> AppResult<()>;
}

/// Stores the snapshot as a flat JSON object on disk.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self) -> AppResult<Option<HashMap<String, String>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn save(&self, snapshot: &HashMap<String, String>) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(snapshot)?)?;
        Ok(())
    }
}

/// Periodic performance loop: refreshes equity, reconciles the ledger
/// against the exchange's open positions, and persists a snapshot.
pub struct PerformanceTracker {
    exchange: Arc<KrakenClient>,
    cache: Arc<MarketDataCache>,
    ledger: Arc<TradeLedger>,
    store: Box<dyn SnapshotStore>,
    metrics: Mutex<PerformanceMetrics>,
    interval: Duration,
    running: AtomicBool,
    // watch rather than Notify: a stop during an in-flight tick must
    // still interrupt the sleep that follows it.
    shutdown: watch::Sender<bool>,
}

impl PerformanceTracker {
    /// Build the tracker, seeding metrics from a previous snapshot when
    /// one exists so peak equity and drawdown survive restarts.
    pub fn new(
        exchange: Arc<KrakenClient>,
        cache: Arc<MarketDataCache>,
        ledger: Arc<TradeLedger>,
        store: Box<dyn SnapshotStore>,
    ) -> AppResult<Self> {
        let metrics = match store.load()? {
            Some(snapshot) => {
                info!("Restored performance snapshot");
                PerformanceMetrics::from_snapshot(&snapshot)
            }
            None => PerformanceMetrics::default(),
        };

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            exchange,
            cache,
            ledger,
            store,
            metrics: Mutex::new(metrics),
            interval: DEFAULT_INTERVAL,
            running: AtomicBool::new(true),
            shutdown,
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        self.metrics.lock().unwrap().clone()
    }

    /// Run the tracking loop until stopped. Transient exchange errors
    /// are logged and the loop keeps going.
    pub async fn run(&self) {
        let mut shutdown = self.shutdown.subscribe();
        while self.running.load(Ordering::SeqCst) {
            if let Err(e) = self.tick().await {
                warn!("Performance update failed: {}", e);
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sleep(self.interval) => {}
            }
        }
        info!("Performance tracker stopped");
    }

    /// One tracking pass: equity reading, ledger reconciliation,
    /// snapshot persistence.
    pub async fn tick(&self) -> AppResult<()> {
        let equity = self.exchange.total_equity().await?;
        self.reconcile_positions().await?;

        let stats = self.ledger.stats();
        let snapshot = {
            let mut metrics = self.metrics.lock().unwrap();
            metrics.total_trades = stats.total_trades;
            metrics.open_trades = stats.open_trades;
            metrics.winning_trades = stats.winning_trades;
            metrics.losing_trades = stats.losing_trades;
            metrics.realized_pnl = stats.realized_pnl;
            metrics.best_trade = stats.best_trade;
            metrics.worst_trade = stats.worst_trade;
            metrics.observe_equity(equity);
            info!(
                "Performance: equity={} drawdown={:.4} max_drawdown={:.4} trades={} win_rate={:.1}%",
                metrics.current_equity,
                metrics.current_drawdown,
                metrics.max_drawdown,
                metrics.total_trades,
                metrics.win_rate()
            );
            metrics.to_snapshot()
        };
        self.store.save(&snapshot)
    }

    /// Close ledger entries whose order no longer backs an open position
    /// on the exchange (the bracket fired or the position was closed
    /// out of band). The exit price is the cached last price, falling
    /// back to the entry price when the feed has nothing.
    async fn reconcile_positions(&self) -> AppResult<()> {
        let positions = self.exchange.get_open_positions().await?;
        let live_orders: HashSet<String> = positions
            .values()
            .filter_map(|p| p.get("ordertxid").and_then(|v| v.as_str()))
            .map(|s| s.to_string())
            .collect();

        for trade in self.ledger.open_trades() {
            if !live_orders.contains(&trade.order_id) {
                let exit_price = self
                    .cache
                    .last_price(&trade.instrument)
                    .unwrap_or(trade.entry_price);
                self.ledger.mark_closed(&trade.order_id, exit_price);
            }
        }
        Ok(())
    }

    /// Persist the current snapshot, for shutdown.
    pub fn persist(&self) -> AppResult<()> {
        let snapshot = self.metrics.lock().unwrap().to_snapshot();
        self.store.save(&snapshot)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown.send(true);
    }
}
