// src/trading/risk.rs
use crate::config::RiskConfig;
use crate::domain::errors::{TradingError, TradingResult};
use crate::domain::models::Side;
use rust_decimal::Decimal;

/// Position notional for one trade: the stop-distance sizing
/// `equity * risk_per_trade / stop_loss_pct`, capped at
/// `equity * max_position_fraction`.
pub fn size_position(
    equity: Decimal,
    risk_per_trade: Decimal,
    stop_loss_pct: Decimal,
    max_position_fraction: Decimal,
) -> TradingResult<Decimal> {
    if equity <= Decimal::ZERO {
        return Err(TradingError::RiskLimitExceeded(format!(
            "non-positive equity: {}",
            equity
        )));
    }
    if stop_loss_pct <= Decimal::ZERO {
        return Err(TradingError::RiskLimitExceeded(format!(
            "non-positive stop-loss distance: {}",
            stop_loss_pct
        )));
    }

    let cap = equity * max_position_fraction;
    let risk_sized = equity * risk_per_trade / stop_loss_pct;
    let size = risk_sized.min(cap);
    if size <= Decimal::ZERO {
        return Err(TradingError::RiskLimitExceeded(format!(
            "computed position size is non-positive: {}",
            size
        )));
    }
    Ok(size)
}

/// Stop-loss and take-profit prices for an entry at `price`.
pub fn bracket_prices(side: Side, price: Decimal, risk: &RiskConfig) -> (Decimal, Decimal) {
    match side {
        Side::Buy => (
            price * (Decimal::ONE - risk.stop_loss_pct),
            price * (Decimal::ONE + risk.take_profit_pct),
        ),
        Side::Sell => (
            price * (Decimal::ONE + risk.stop_loss_pct),
            price * (Decimal::ONE - risk.take_profit_pct),
        ),
    }
}
