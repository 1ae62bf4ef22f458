use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Position-sizing and stop/take-profit parameters the risk manager checks orders against
/// (spec §4.C), grounded on the original trading config's `LEVERAGE`/`MAX_POSITION_SIZE`/
/// `MAX_DAILY_LOSS`/`MAX_DRAWDOWN`/`STOP_LOSS_PERCENT`/`TAKE_PROFIT_PERCENT` fields.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct TradingConfig {
    pub leverage: Decimal,
    /// Fraction of account capital a single symbol's margin may consume (default 5%).
    pub max_position_size: Decimal,
    pub max_daily_loss: Decimal,
    pub max_drawdown: Decimal,
    pub enable_stop_loss: bool,
    pub stop_loss_percent: Decimal,
    pub take_profit_percent: Decimal,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            leverage: dec!(5),
            max_position_size: dec!(0.05),
            max_daily_loss: dec!(100),
            max_drawdown: dec!(0.2),
            enable_stop_loss: true,
            stop_loss_percent: dec!(0.02),
            take_profit_percent: dec!(0.04),
        }
    }
}
