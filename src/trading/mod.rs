// src/trading/mod.rs
pub mod executor;
pub mod ledger;
pub mod performance;
pub mod risk;
pub mod strategies;
