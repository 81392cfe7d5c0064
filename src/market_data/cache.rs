// src/market_data/cache.rs
use crate::domain::models::{InstrumentId, PriceQuote};
use chrono::Utc;
use log::debug;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory store of the latest quote per instrument, written by the
/// WebSocket feed and read by the trading loops. Last write wins; no
/// history is kept here (candles come from the REST OHLC endpoint).
#[derive(Debug, Default)]
pub struct MarketDataCache {
    quotes: RwLock<HashMap<InstrumentId, PriceQuote>>,
}

impl MarketDataCache {
    pub fn new() -> Self {
        Self {
            quotes: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the stored quote for an instrument with a fresh ticker
    /// observation.
    pub fn update_quote(&self, quote: PriceQuote) {
        debug!(
            "Cache update {}: price={} volume={}",
            quote.instrument, quote.last_price, quote.last_volume
        );
        let mut quotes = self.quotes.write().unwrap();
        quotes.insert(quote.instrument.clone(), quote);
    }

    /// Fold an executed trade into the cached quote: the trade price
    /// becomes the last price, the stored volume is left as the ticker
    /// reported it.
    pub fn apply_trade(&self, instrument: &str, price: Decimal) {
        let mut quotes = self.quotes.write().unwrap();
        match quotes.get_mut(instrument) {
            Some(quote) => {
                quote.last_price = price;
                quote.observed_at = Utc::now();
            }
            None => {
                quotes.insert(
                    instrument.to_string(),
                    PriceQuote::new(instrument, price, Decimal::ZERO),
                );
            }
        }
    }

    pub fn quote(&self, instrument: &str) -> Option<PriceQuote> {
        let quotes = self.quotes.read().unwrap();
        quotes.get(instrument).cloned()
    }

    pub fn last_price(&self, instrument: &str) -> Option<Decimal> {
        let quotes = self.quotes.read().unwrap();
        quotes.get(instrument).map(|q| q.last_price)
    }

    /// Instruments with at least one observation so far.
    pub fn instruments(&self) -> Vec<InstrumentId> {
        let quotes = self.quotes.read().unwrap();
        quotes.keys().cloned().collect()
    }
}
