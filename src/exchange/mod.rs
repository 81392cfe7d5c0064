// src/exchange/mod.rs
pub mod feed;
pub mod kraken;

pub use feed::MarketDataFeed;
pub use kraken::KrakenClient;
