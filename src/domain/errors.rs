// src/domain/errors.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Trading error: {0}")]
    Trading(#[from] TradingError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures talking to the exchange's REST API.
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("missing API credentials")]
    MissingCredentials,

    #[error("malformed signing input: {0}")]
    Signing(String),

    #[error("broker error on {endpoint}: {message}")]
    Broker { endpoint: String, message: String },

    #[error("transport error on {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    #[error("unexpected response from {endpoint}: {message}")]
    Parse { endpoint: String, message: String },

    #[error("risk limit exceeded: {0}")]
    RiskLimitExceeded(String),
}

/// Failures on the live market-data feed. Always transient: the feed
/// loop retries at a fixed delay and never terminates the process.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("feed connection error: {0}")]
    Connection(String),

    #[error("feed protocol error: {0}")]
    Protocol(String),

    #[error("feed connection closed by remote")]
    Closed,
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("insufficient candle data: need at least {required}, got {got}")]
    InsufficientData { required: usize, got: usize },
}

#[derive(Error, Debug)]
pub enum TradingError {
    #[error("risk limit exceeded: {0}")]
    RiskLimitExceeded(String),

    #[error("no market data available for {0}")]
    NoMarketData(String),
}

// Result type aliases for convenience
pub type AppResult<T> = Result<T, AppError>;
pub type ExchangeResult<T> = Result<T, ExchangeError>;
pub type FeedResult<T> = Result<T, FeedError>;
pub type AnalysisResult<T> = Result<T, AnalysisError>;
pub type TradingResult<T> = Result<T, TradingError>;
