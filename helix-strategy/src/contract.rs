//! The strategy contract every non-grid strategy implements (spec §6.1).

use crate::error::StrategyError;
use async_trait::async_trait;
use helix_execution::{adapter::Kline, position::Position, signal::Signal};
use helix_instrument::symbol::Symbol;
use std::collections::HashMap;

/// One symbol's ordered kline history, oldest first, exactly as returned by
/// [`helix_execution::adapter::ExchangeAdapter::get_klines`] plus whatever indicator columns
/// a strategy has computed over it.
pub type KlineSeries = Vec<Kline>;

/// Implemented by strategies that plug into the live trading engine's per-symbol kline
/// dispatch (spec §4.D Per-symbol kline dispatch, §6.1). `calculate_signal` is invoked once
/// per newly-closed kline per symbol, never on partial candles.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Produce zero or more signals from the current market-data snapshot across every
    /// symbol the strategy is registered for. May suspend (network or CPU-bound indicator
    /// work); the engine awaits this on its kline-dispatch path.
    async fn calculate_signal(
        &mut self,
        market_data: &HashMap<Symbol, KlineSeries>,
    ) -> Result<Vec<Signal>, StrategyError>;

    /// Backtester-only early-exit hook; the live engine never calls this (stop-loss/take-profit
    /// there are enforced by the position monitor loop instead).
    fn should_exit_position(&self, position: &Position, current_row: &Kline) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysHoldStrategy;

    #[async_trait]
    impl Strategy for AlwaysHoldStrategy {
        async fn calculate_signal(
            &mut self,
            _market_data: &HashMap<Symbol, KlineSeries>,
        ) -> Result<Vec<Signal>, StrategyError> {
            Ok(Vec::new())
        }

        fn should_exit_position(&self, _position: &Position, _current_row: &Kline) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn a_strategy_producing_no_signals_is_a_valid_implementation() {
        let mut strategy = AlwaysHoldStrategy;
        let signals = strategy.calculate_signal(&HashMap::new()).await.unwrap();
        assert!(signals.is_empty());
    }
}
