// src/analysis/mod.rs
pub mod indicators;

pub use indicators::{analyze, BreakoutLevels, MarketAnalysis, Trend};
