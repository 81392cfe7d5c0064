// src/domain/models.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;

/// Exchange trading-pair symbol, e.g. "XBT/USD".
pub type InstrumentId = String;

/// Latest observed price/volume for one instrument. One live quote per
/// instrument in the cache, overwritten on every feed tick.
#[derive(Debug, Clone)]
pub struct PriceQuote {
    pub instrument: InstrumentId,
    pub last_price: Decimal,
    pub last_volume: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl PriceQuote {
    pub fn new(instrument: &str, last_price: Decimal, last_volume: Decimal) -> Self {
        Self {
            instrument: instrument.to_string(),
            last_price,
            last_volume,
            observed_at: Utc::now(),
        }
    }
}

/// One OHLC candle. Sequences are ordered ascending by timestamp.
#[derive(Debug, Clone)]
pub struct Candle {
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Wire representation used by the exchange's order API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A trade signal produced by one strategy for one instrument. Ephemeral:
/// produced and consumed within a single orchestration cycle.
#[derive(Debug, Clone)]
pub struct Signal {
    pub instrument: InstrumentId,
    pub side: Side,
    pub strategy: String,
}

/// Exchange acknowledgment for a submitted order.
#[derive(Debug, Clone)]
pub struct OrderAck {
    pub order_id: String,
    pub txids: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeStatus {
    Open,
    Closed,
}

/// An order we placed, tracked from submission until the matching position
/// is confirmed gone.
#[derive(Debug, Clone)]
pub struct ActiveTrade {
    pub order_id: String,
    pub instrument: InstrumentId,
    pub side: Side,
    pub order_type: OrderType,
    pub volume: Decimal,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub leverage: u32,
    pub placed_at: DateTime<Utc>,
    pub status: TradeStatus,
    pub exit_price: Option<Decimal>,
    pub pnl: Option<Decimal>,
}

impl ActiveTrade {
    /// Realized PnL if the trade were closed at `exit_price`.
    pub fn pnl_at(&self, exit_price: Decimal) -> Decimal {
        let price_diff = match self.side {
            Side::Buy => exit_price - self.entry_price,
            Side::Sell => self.entry_price - exit_price,
        };
        price_diff * self.volume
    }
}
