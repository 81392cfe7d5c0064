// src/analysis/indicators.rs
//
// Hand-rolled indicator math over candle history. All arithmetic here is
// f64: indicators feed threshold comparisons, not order sizing, so the
// Decimal precision used elsewhere buys nothing.
use crate::config::{IndicatorParams, StrategyKind};
use crate::domain::errors::{AnalysisError, AnalysisResult};
use crate::domain::models::Candle;
use rust_decimal::prelude::ToPrimitive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Bullish,
    Bearish,
}

/// Breakout reference levels computed over the window preceding the
/// current candle.
#[derive(Debug, Clone, Copy)]
pub struct BreakoutLevels {
    pub period_high: f64,
    pub period_low: f64,
    pub atr: f64,
}

/// Result of one analysis pass over a candle series.
#[derive(Debug, Clone)]
pub struct MarketAnalysis {
    pub trend: Trend,
    pub sma_short: f64,
    pub sma_long: Option<f64>,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub last_close: f64,
    pub breakout: Option<BreakoutLevels>,
}

/// Simple moving average over each full window; output has
/// `values.len() - period + 1` entries.
pub fn sma(values: &[f64], period: usize) -> AnalysisResult<Vec<f64>> {
    if period == 0 || values.len() < period {
        return Err(AnalysisError::InsufficientData {
            required: period,
            got: values.len(),
        });
    }
    Ok(values
        .windows(period)
        .map(|w| w.iter().sum::<f64>() / period as f64)
        .collect())
}

/// Exponential moving average seeded from the first value, so the output
/// is the same length as the input.
pub fn ema(values: &[f64], period: usize) -> AnalysisResult<Vec<f64>> {
    if period == 0 || values.is_empty() {
        return Err(AnalysisError::InsufficientData {
            required: period.max(1),
            got: values.len(),
        });
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = values[0];
    out.push(prev);
    for &v in &values[1..] {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    Ok(out)
}

/// Relative strength index with Wilder smoothing. Returns the latest
/// value, in [0, 100]; saturates at 100 when no losses occurred in the
/// window.
pub fn rsi(values: &[f64], period: usize) -> AnalysisResult<f64> {
    if period == 0 || values.len() < period + 1 {
        return Err(AnalysisError::InsufficientData {
            required: period + 1,
            got: values.len(),
        });
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let delta = values[i] - values[i - 1];
        if delta > 0.0 {
            avg_gain += delta;
        } else {
            avg_loss += -delta;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    for i in (period + 1)..values.len() {
        let delta = values[i] - values[i - 1];
        let (gain, loss) = if delta > 0.0 {
            (delta, 0.0)
        } else {
            (0.0, -delta)
        };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    if avg_loss == 0.0 {
        return Ok(100.0);
    }
    let rs = avg_gain / avg_loss;
    Ok(100.0 - 100.0 / (1.0 + rs))
}

/// MACD(12, 26) with a 9-period signal line. Returns the latest
/// (macd, signal) pair.
pub fn macd(values: &[f64]) -> AnalysisResult<(f64, f64)> {
    let fast = ema(values, 12)?;
    let slow = ema(values, 26)?;
    let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    let signal = ema(&line, 9)?;
    Ok((*line.last().unwrap(), *signal.last().unwrap()))
}

/// Average true range with Wilder smoothing; returns the latest value.
pub fn atr(candles: &[Candle], period: usize) -> AnalysisResult<f64> {
    if period == 0 || candles.len() < period + 1 {
        return Err(AnalysisError::InsufficientData {
            required: period + 1,
            got: candles.len(),
        });
    }

    let mut ranges = Vec::with_capacity(candles.len() - 1);
    for i in 1..candles.len() {
        let high = decimal_to_f64(candles[i].high);
        let low = decimal_to_f64(candles[i].low);
        let prev_close = decimal_to_f64(candles[i - 1].close);
        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());
        ranges.push(tr);
    }

    let mut value = ranges[..period].iter().sum::<f64>() / period as f64;
    for &tr in &ranges[period..] {
        value = (value * (period as f64 - 1.0) + tr) / period as f64;
    }
    Ok(value)
}

pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| decimal_to_f64(c.close)).collect()
}

fn decimal_to_f64(d: rust_decimal::Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

/// Run the indicator set a strategy kind needs over a candle series.
/// Trend following requires the long SMA window; the range strategies
/// get by on the short window plus their own lookbacks.
pub fn analyze(
    kind: StrategyKind,
    candles: &[Candle],
    params: &IndicatorParams,
) -> AnalysisResult<MarketAnalysis> {
    let required = match kind {
        StrategyKind::TrendFollowing => params.sma_long,
        StrategyKind::MeanReversion => params.sma_short.max(params.rsi_period + 1),
        StrategyKind::Breakout => (params.breakout_period + 1).max(params.atr_period + 1),
    };
    if candles.len() < required {
        return Err(AnalysisError::InsufficientData {
            required,
            got: candles.len(),
        });
    }

    let closes = closes(candles);
    let last_close = *closes.last().unwrap();

    let sma_short = *sma(&closes, params.sma_short)?.last().unwrap();
    let sma_long = if closes.len() >= params.sma_long {
        Some(*sma(&closes, params.sma_long)?.last().unwrap())
    } else {
        None
    };

    // With a full long window the trend is the short/long SMA cross;
    // otherwise fall back to price versus the short SMA.
    let trend = match sma_long {
        Some(long) if sma_short > long => Trend::Bullish,
        Some(_) => Trend::Bearish,
        None if last_close > sma_short => Trend::Bullish,
        None => Trend::Bearish,
    };

    let rsi = rsi(&closes, params.rsi_period)?;
    let (macd, macd_signal) = macd(&closes)?;

    let breakout = if kind == StrategyKind::Breakout {
        // The reference window excludes the current candle so a fresh
        // high counts as a breakout of the prior range.
        let window = &candles[candles.len() - 1 - params.breakout_period..candles.len() - 1];
        let period_high = window
            .iter()
            .map(|c| decimal_to_f64(c.high))
            .fold(f64::MIN, f64::max);
        let period_low = window
            .iter()
            .map(|c| decimal_to_f64(c.low))
            .fold(f64::MAX, f64::min);
        Some(BreakoutLevels {
            period_high,
            period_low,
            atr: atr(candles, params.atr_period)?,
        })
    } else {
        None
    };

    Ok(MarketAnalysis {
        trend,
        sma_short,
        sma_long,
        rsi,
        macd,
        macd_signal,
        last_close,
        breakout,
    })
}
