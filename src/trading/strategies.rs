// src/trading/strategies.rs
use crate::analysis::{MarketAnalysis, Trend};
use crate::config::{StrategyConfig, StrategyKind};
use crate::domain::errors::TradingResult;
use crate::domain::models::{Side, Signal};
use async_trait::async_trait;
use log::debug;

/// Map one analysis result to an optional trade signal. Buy conditions
/// are checked before sell conditions; at most one signal per cycle.
pub fn evaluate(pair: &str, config: &StrategyConfig, analysis: &MarketAnalysis) -> Option<Signal> {
    let side = match config.kind {
        StrategyKind::TrendFollowing => trend_following(config, analysis),
        StrategyKind::MeanReversion => mean_reversion(config, analysis),
        StrategyKind::Breakout => breakout(config, analysis),
    }?;

    debug!(
        "Strategy {} signals {} on {} (rsi={:.2}, trend={:?})",
        config.name, side, pair, analysis.rsi, analysis.trend
    );
    Some(Signal {
        instrument: pair.to_string(),
        side,
        strategy: config.name.clone(),
    })
}

/// Trade with the SMA trend, filtered by RSI so we do not chase an
/// already-stretched move.
fn trend_following(config: &StrategyConfig, analysis: &MarketAnalysis) -> Option<Side> {
    match analysis.trend {
        Trend::Bullish if analysis.rsi < config.indicators.rsi_overbought => Some(Side::Buy),
        Trend::Bearish if analysis.rsi > config.indicators.rsi_oversold => Some(Side::Sell),
        _ => None,
    }
}

/// Fade RSI extremes.
fn mean_reversion(config: &StrategyConfig, analysis: &MarketAnalysis) -> Option<Side> {
    if analysis.rsi < config.indicators.rsi_oversold {
        Some(Side::Buy)
    } else if analysis.rsi > config.indicators.rsi_overbought {
        Some(Side::Sell)
    } else {
        None
    }
}

/// Enter when the close clears the prior range by half an ATR.
fn breakout(_config: &StrategyConfig, analysis: &MarketAnalysis) -> Option<Side> {
    let levels = analysis.breakout?;
    let buffer = levels.atr * 0.5;
    if analysis.last_close > levels.period_high + buffer {
        Some(Side::Buy)
    } else if analysis.last_close < levels.period_low - buffer {
        Some(Side::Sell)
    } else {
        None
    }
}

/// Hook for vetoing signals before they reach the exchange, e.g. a
/// per-instrument exposure cap or a circuit breaker.
#[async_trait]
pub trait SignalValidator: Send + Sync {
    async fn validate(&self, signal: &Signal) -> TradingResult<bool>;
}

/// Default validator: every signal passes.
pub struct AcceptAll;

#[async_trait]
impl SignalValidator for AcceptAll {
    async fn validate(&self, _signal: &Signal) -> TradingResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::BreakoutLevels;
    use crate::config::default_strategies;

    fn analysis(trend: Trend, rsi: f64) -> MarketAnalysis {
        MarketAnalysis {
            trend,
            sma_short: 100.0,
            sma_long: Some(99.0),
            rsi,
            macd: 0.0,
            macd_signal: 0.0,
            last_close: 100.0,
            breakout: None,
        }
    }

    fn strategy(kind: StrategyKind) -> StrategyConfig {
        default_strategies()
            .into_iter()
            .find(|s| s.kind == kind)
            .unwrap()
    }

    #[test]
    fn trend_following_buys_bullish_below_overbought() {
        let config = strategy(StrategyKind::TrendFollowing);
        let signal = evaluate("XBT/USD", &config, &analysis(Trend::Bullish, 55.0)).unwrap();
        assert_eq!(signal.side, Side::Buy);
        assert_eq!(signal.strategy, "trend_following");
        assert_eq!(signal.instrument, "XBT/USD");
    }

    #[test]
    fn trend_following_holds_when_overbought() {
        let config = strategy(StrategyKind::TrendFollowing);
        assert!(evaluate("XBT/USD", &config, &analysis(Trend::Bullish, 75.0)).is_none());
    }

    #[test]
    fn trend_following_sells_bearish_above_oversold() {
        let config = strategy(StrategyKind::TrendFollowing);
        let signal = evaluate("XBT/USD", &config, &analysis(Trend::Bearish, 45.0)).unwrap();
        assert_eq!(signal.side, Side::Sell);
    }

    #[test]
    fn mean_reversion_fades_extremes() {
        let config = strategy(StrategyKind::MeanReversion);
        let buy = evaluate("ETH/USD", &config, &analysis(Trend::Bearish, 25.0)).unwrap();
        assert_eq!(buy.side, Side::Buy);
        let sell = evaluate("ETH/USD", &config, &analysis(Trend::Bullish, 75.0)).unwrap();
        assert_eq!(sell.side, Side::Sell);
        assert!(evaluate("ETH/USD", &config, &analysis(Trend::Bullish, 50.0)).is_none());
    }

    #[test]
    fn breakout_needs_half_an_atr_of_clearance() {
        let config = strategy(StrategyKind::Breakout);
        let mut a = analysis(Trend::Bullish, 50.0);
        a.breakout = Some(BreakoutLevels {
            period_high: 100.0,
            period_low: 90.0,
            atr: 4.0,
        });

        // 101 clears the high but not high + 2.0.
        a.last_close = 101.0;
        assert!(evaluate("XBT/USD", &config, &a).is_none());

        a.last_close = 102.5;
        assert_eq!(evaluate("XBT/USD", &config, &a).unwrap().side, Side::Buy);

        a.last_close = 87.5;
        assert_eq!(evaluate("XBT/USD", &config, &a).unwrap().side, Side::Sell);
    }

    #[tokio::test]
    async fn accept_all_passes_everything() {
        let signal = Signal {
            instrument: "XBT/USD".to_string(),
            side: Side::Buy,
            strategy: "trend_following".to_string(),
        };
        assert!(AcceptAll.validate(&signal).await.unwrap());
    }
}
