// src/trading/ledger.rs
use crate::domain::models::{ActiveTrade, TradeStatus};
use log::info;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;

/// Aggregate trade statistics over the ledger's lifetime.
#[derive(Debug, Clone, Default)]
pub struct TradeStats {
    pub total_trades: usize,
    pub open_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub realized_pnl: Decimal,
    pub best_trade: Decimal,
    pub worst_trade: Decimal,
}

/// In-process record of every order the bot has placed, keyed by order
/// id. Trades move from Open to Closed exactly once; closed trades are
/// retained so statistics survive for the session.
#[derive(Debug, Default)]
pub struct TradeLedger {
    trades: Mutex<HashMap<String, ActiveTrade>>,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self {
            trades: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_open(&self, trade: ActiveTrade) {
        info!(
            "Ledger open {} {} {} volume={} entry={}",
            trade.order_id, trade.side, trade.instrument, trade.volume, trade.entry_price
        );
        let mut trades = self.trades.lock().unwrap();
        trades.insert(trade.order_id.clone(), trade);
    }

    /// Close an open trade at `exit_price`. Idempotent: closing a trade
    /// that is already closed or unknown is a no-op returning None.
    pub fn mark_closed(&self, order_id: &str, exit_price: Decimal) -> Option<Decimal> {
        let mut trades = self.trades.lock().unwrap();
        let trade = trades.get_mut(order_id)?;
        if trade.status == TradeStatus::Closed {
            return None;
        }
        let pnl = trade.pnl_at(exit_price);
        trade.status = TradeStatus::Closed;
        trade.exit_price = Some(exit_price);
        trade.pnl = Some(pnl);
        info!(
            "Ledger close {} {} exit={} pnl={}",
            order_id, trade.instrument, exit_price, pnl
        );
        Some(pnl)
    }

    pub fn open_trades(&self) -> Vec<ActiveTrade> {
        let trades = self.trades.lock().unwrap();
        trades
            .values()
            .filter(|t| t.status == TradeStatus::Open)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> TradeStats {
        let trades = self.trades.lock().unwrap();
        let mut stats = TradeStats::default();
        for trade in trades.values() {
            stats.total_trades += 1;
            match trade.status {
                TradeStatus::Open => stats.open_trades += 1,
                TradeStatus::Closed => {
                    let pnl = trade.pnl.unwrap_or(Decimal::ZERO);
                    stats.realized_pnl += pnl;
                    // Breakeven closes count in neither bucket.
                    if pnl > Decimal::ZERO {
                        stats.winning_trades += 1;
                    } else if pnl < Decimal::ZERO {
                        stats.losing_trades += 1;
                    }
                    if pnl > stats.best_trade {
                        stats.best_trade = pnl;
                    }
                    if pnl < stats.worst_trade {
                        stats.worst_trade = pnl;
                    }
                }
            }
        }
        stats
    }
}
