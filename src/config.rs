// src/config.rs
use crate::domain::errors::{AppError, AppResult};
use dotenv::dotenv;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::File;

/// Trading bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Exchange API credentials and endpoints
    pub exchange: ExchangeConfig,

    /// Trading configuration
    pub trading: TradingConfig,

    /// Risk management configuration
    pub risk: RiskConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Exchange API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// API key (already decrypted by the credential provider)
    pub api_key: String,

    /// API secret, base64-encoded
    pub api_secret: String,

    /// REST base URL
    pub base_url: String,

    /// WebSocket feed URL
    pub ws_url: String,
}

/// Trading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Instruments to trade (e.g. ["XBT/USD", "ETH/USD"])
    pub pairs: Vec<String>,

    /// Active strategies, keyed by name for the orchestrator's lifetime
    pub strategies: Vec<StrategyConfig>,

    /// Where the performance snapshot is persisted
    pub metrics_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    TrendFollowing,
    MeanReversion,
    Breakout,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::TrendFollowing => "trend_following",
            StrategyKind::MeanReversion => "mean_reversion",
            StrategyKind::Breakout => "breakout",
        }
    }
}

/// Per-strategy configuration, immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    pub kind: StrategyKind,

    /// Fraction of equity risked per trade, 0 < r <= 1
    pub risk_per_trade: Decimal,

    /// Leverage multiplier, validated against RiskConfig::max_leverage
    pub leverage: u32,

    /// Analysis cycle timeframe in minutes
    pub timeframe_minutes: u64,

    pub indicators: IndicatorParams,
}

/// Indicator windows and thresholds used by the analysis step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorParams {
    pub sma_short: usize,
    pub sma_long: usize,
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub atr_period: usize,
    pub breakout_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            sma_short: 20,
            sma_long: 50,
            rsi_period: 14,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            atr_period: 14,
            breakout_period: 20,
        }
    }
}

/// Risk management configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Cap on position size as a fraction of equity
    pub max_position_fraction: Decimal,

    /// Leverage ceiling enforced before any order leaves the process
    pub max_leverage: u32,

    /// Stop-loss distance as a fraction of entry price
    pub stop_loss_pct: Decimal,

    /// Take-profit distance as a fraction of entry price
    pub take_profit_pct: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_fraction: dec!(0.1),
            max_leverage: 5,
            stop_loss_pct: dec!(0.02),
            take_profit_pct: dec!(0.06),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g. "info", "debug", "warn", "error")
    pub level: String,

    /// Log to file
    pub to_file: bool,

    /// Log file path
    pub file_path: Option<String>,
}

impl Config {
    /// Load configuration from environment variables. Fails if API
    /// credentials are absent; everything else has defaults.
    pub fn from_env() -> AppResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let exchange = ExchangeConfig {
            api_key: env::var("KRAKEN_API_KEY").map_err(|_| {
                AppError::Config("Missing KRAKEN_API_KEY environment variable".to_string())
            })?,
            api_secret: env::var("KRAKEN_API_SECRET").map_err(|_| {
                AppError::Config("Missing KRAKEN_API_SECRET environment variable".to_string())
            })?,
            base_url: env::var("KRAKEN_BASE_URL")
                .unwrap_or_else(|_| "https://api.kraken.com".to_string()),
            ws_url: env::var("KRAKEN_WS_URL")
                .unwrap_or_else(|_| "wss://ws.kraken.com".to_string()),
        };

        let pairs = env::var("TRADING_PAIRS")
            .unwrap_or_else(|_| "XBT/USD,ETH/USD".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let trading = TradingConfig {
            pairs,
            strategies: default_strategies(),
            metrics_path: env::var("METRICS_PATH")
                .unwrap_or_else(|_| "data/performance_metrics.json".to_string()),
        };

        let defaults = RiskConfig::default();
        let risk = RiskConfig {
            max_position_fraction: parse_env("MAX_POSITION_FRACTION", defaults.max_position_fraction),
            max_leverage: parse_env("MAX_LEVERAGE", defaults.max_leverage),
            stop_loss_pct: parse_env("STOP_LOSS_PCT", defaults.stop_loss_pct),
            take_profit_pct: parse_env("TAKE_PROFIT_PCT", defaults.take_profit_pct),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            to_file: env::var("LOG_TO_FILE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            file_path: env::var("LOG_FILE_PATH").ok(),
        };

        Ok(Config {
            exchange,
            trading,
            risk,
            logging,
        })
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> AppResult<()> {
        let mut builder = env_logger::Builder::new();

        let log_level = match self.logging.level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            _ => log::LevelFilter::Info,
        };

        builder.filter_level(log_level);

        if self.logging.to_file {
            if let Some(file_path) = &self.logging.file_path {
                let file = File::create(file_path).map_err(|e| {
                    AppError::Config(format!("Failed to create log file: {}", e))
                })?;

                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
        }

        builder.init();

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// The built-in strategy book. One config per named strategy; each runs
/// against every configured pair.
pub fn default_strategies() -> Vec<StrategyConfig> {
    vec![
        StrategyConfig {
            name: "trend_following".to_string(),
            kind: StrategyKind::TrendFollowing,
            risk_per_trade: dec!(0.01),
            leverage: 3,
            timeframe_minutes: 60,
            indicators: IndicatorParams::default(),
        },
        StrategyConfig {
            name: "mean_reversion".to_string(),
            kind: StrategyKind::MeanReversion,
            risk_per_trade: dec!(0.008),
            leverage: 2,
            timeframe_minutes: 30,
            indicators: IndicatorParams::default(),
        },
        StrategyConfig {
            name: "breakout".to_string(),
            kind: StrategyKind::Breakout,
            risk_per_trade: dec!(0.012),
            leverage: 4,
            timeframe_minutes: 240,
            indicators: IndicatorParams::default(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_strategy_book_has_three_entries() {
        let strategies = default_strategies();
        assert_eq!(strategies.len(), 3);

        let trend = &strategies[0];
        assert_eq!(trend.kind, StrategyKind::TrendFollowing);
        assert_eq!(trend.leverage, 3);
        assert_eq!(trend.timeframe_minutes, 60);
        assert_eq!(trend.risk_per_trade, dec!(0.01));
    }

    #[test]
    fn risk_defaults_match_exchange_brackets() {
        let risk = RiskConfig::default();
        assert_eq!(risk.stop_loss_pct, dec!(0.02));
        assert_eq!(risk.take_profit_pct, dec!(0.06));
        assert_eq!(risk.max_position_fraction, dec!(0.1));
        assert_eq!(risk.max_leverage, 5);
    }

    #[test]
    fn strategy_kind_wire_names() {
        assert_eq!(StrategyKind::TrendFollowing.as_str(), "trend_following");
        assert_eq!(StrategyKind::MeanReversion.as_str(), "mean_reversion");
        assert_eq!(StrategyKind::Breakout.as_str(), "breakout");
    }
}
