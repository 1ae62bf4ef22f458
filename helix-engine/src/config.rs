use helix_instrument::symbol::Symbol;
use helix_risk::config::TradingConfig;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Construction-time configuration for a [`crate::live::LiveTradingEngine`] (spec §9 "config
/// passed by construction, no singletons"). One instance is built per exchange adapter the
/// engine is wired to.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Symbols this engine instance trades, in their canonical form.
    pub symbols: Vec<Symbol>,
    /// Kline interval the market-data fan-in and preload both request (e.g. `"15m"`).
    pub kline_interval: String,
    /// Pre-trade and portfolio bookkeeping limits (spec §4.C).
    pub risk: TradingConfig,
    /// Fraction of account capital a single new order's projected margin may not exceed before
    /// the kline dispatcher's own gate vetoes it ahead of the risk manager (spec §4.D Per-symbol
    /// kline dispatch, "10%-of-capital margin cap check").
    pub margin_cap_pct: Decimal,
    /// Maximum rows requested per `get_klines` preload call.
    pub preload_klines_limit: u32,
    /// Minimum rows a symbol's cache must hold before its first `calculate_signal` invocation.
    pub min_preload_rows: usize,
}

impl EngineConfig {
    pub fn new(symbols: Vec<Symbol>, kline_interval: impl Into<String>) -> Self {
        Self {
            symbols,
            kline_interval: kline_interval.into(),
            risk: TradingConfig::default(),
            margin_cap_pct: dec!(0.10),
            preload_klines_limit: 1000,
            min_preload_rows: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_preload_and_margin_bounds() {
        let config = EngineConfig::new(vec![Symbol::new("ETH_USDC_PERP")], "15m");
        assert_eq!(config.preload_klines_limit, 1000);
        assert_eq!(config.min_preload_rows, 50);
        assert_eq!(config.margin_cap_pct, dec!(0.10));
    }
}
