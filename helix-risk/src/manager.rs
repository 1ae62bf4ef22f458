use crate::{
    config::TradingConfig,
    event::{RiskEvent, RiskEventJournal, RiskEventKind},
};
use chrono::{NaiveDate, Utc};
use helix_instrument::symbol::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

/// A single symbol's open position as tracked by the risk manager, kept independent of the
/// engine's own `Position` record so this crate has no dependency on execution types.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct PositionMargin {
    quantity: Decimal,
    avg_price: Decimal,
    value: Decimal,
    margin: Decimal,
}

/// Outcome of [`RiskManager::check_order_risk`] (spec §4.C).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskCheckResult {
    pub approved: bool,
    pub risk_score: Decimal,
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
    pub max_position_size: Decimal,
    pub suggested_quantity: Decimal,
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
}

/// Pre-trade risk gate plus portfolio bookkeeping for a single engine instance (spec §4.C).
pub struct RiskManager {
    config: TradingConfig,
    positions: HashMap<Symbol, PositionMargin>,
    daily_pnl: Decimal,
    cumulative_pnl: Decimal,
    peak_portfolio_value: Decimal,
    current_drawdown: Decimal,
    daily_trade_count: u32,
    daily_volume: Decimal,
    last_reset_date: NaiveDate,
    journal: RiskEventJournal,
}

impl RiskManager {
    pub fn new(config: TradingConfig) -> Self {
        Self {
            config,
            positions: HashMap::new(),
            daily_pnl: Decimal::ZERO,
            cumulative_pnl: Decimal::ZERO,
            peak_portfolio_value: Decimal::ZERO,
            current_drawdown: Decimal::ZERO,
            daily_trade_count: 0,
            daily_volume: Decimal::ZERO,
            last_reset_date: Utc::now().date_naive(),
            journal: RiskEventJournal::new(),
        }
    }

    /// Step 1: roll the daily counters over if the wall-clock date advanced.
    pub fn reset_daily_metrics(&mut self) {
        let today = Utc::now().date_naive();
        if today != self.last_reset_date {
            self.daily_pnl = Decimal::ZERO;
            self.daily_trade_count = 0;
            self.daily_volume = Decimal::ZERO;
            self.last_reset_date = today;
        }
    }

    /// The fixed nine-step pre-trade check (spec §4.C).
    pub fn check_order_risk(
        &mut self,
        symbol: &Symbol,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        current_price: Option<Decimal>,
        account_capital: Option<Decimal>,
    ) -> RiskCheckResult {
        self.reset_daily_metrics();
        let current_price = current_price.unwrap_or(price);

        let mut violations = Vec::new();
        let mut warnings = Vec::new();
        let mut risk_score = Decimal::ZERO;

        let total_margin_used: Decimal = self.positions.values().map(|p| p.margin).sum();
        let current_margin = self.positions.get(symbol).map(|p| p.margin).unwrap_or(Decimal::ZERO);

        let position_value = quantity * current_price;
        let margin_needed = position_value / self.config.leverage;

        let total_margin_after = match side {
            OrderSide::Buy => total_margin_used - current_margin + margin_needed,
            OrderSide::Sell => total_margin_used - current_margin,
        };

        match account_capital {
            Some(capital) if capital > Decimal::ZERO => {
                let max_margin = capital * self.config.max_position_size;
                if total_margin_after > max_margin {
                    let excess = total_margin_after - max_margin;
                    violations.push(format!("margin exceeds limit: over by {excess}"));
                    risk_score += Decimal::from(30);
                }
            }
            _ => {
                violations.push("account capital unavailable, cannot verify margin limit".to_string());
                risk_score += Decimal::from(30);
            }
        }

        if self.daily_pnl < Decimal::ZERO && self.daily_pnl.abs() > self.config.max_daily_loss {
            violations.push(format!("daily loss limit reached: {}", self.daily_pnl));
            risk_score += Decimal::from(25);
        }

        if self.current_drawdown > self.config.max_drawdown * Decimal::new(8, 1) {
            warnings.push(format!("drawdown elevated: {:.2}%", self.current_drawdown * Decimal::from(100)));
            risk_score += Decimal::from(15);
        }

        let (mut stop_loss_price, mut take_profit_price) = (Decimal::ZERO, Decimal::ZERO);
        if self.config.enable_stop_loss {
            match side {
                OrderSide::Buy => {
                    stop_loss_price = current_price * (Decimal::ONE - self.config.stop_loss_percent);
                    take_profit_price = current_price * (Decimal::ONE + self.config.take_profit_percent);
                }
                OrderSide::Sell => {
                    stop_loss_price = current_price * (Decimal::ONE + self.config.stop_loss_percent);
                    take_profit_price = current_price * (Decimal::ONE - self.config.take_profit_percent);
                }
            }
        }

        if side == OrderSide::Buy && current_price < stop_loss_price {
            violations.push("stop-loss price above current price".to_string());
            risk_score += Decimal::from(20);
        }

        let approved = violations.is_empty();

        if !approved {
            self.journal.record(RiskEvent {
                at: Utc::now(),
                kind: RiskEventKind::OrderRejected,
                symbol: Some(symbol.clone()),
                detail: violations.join("; "),
            });
        } else if !warnings.is_empty() {
            self.journal.record(RiskEvent {
                at: Utc::now(),
                kind: RiskEventKind::RiskWarning,
                symbol: Some(symbol.clone()),
                detail: warnings.join("; "),
            });
        }

        RiskCheckResult {
            approved,
            risk_score,
            violations,
            warnings,
            max_position_size: self.config.max_position_size,
            suggested_quantity: quantity,
            stop_loss_price,
            take_profit_price,
        }
    }

    pub fn update_position(&mut self, symbol: Symbol, side: OrderSide, quantity: Decimal, price: Decimal) {
        let entry = self.positions.entry(symbol).or_default();

        match side {
            OrderSide::Buy => {
                let total_qty = entry.quantity + quantity;
                entry.avg_price = if total_qty > Decimal::ZERO {
                    (entry.quantity * entry.avg_price + quantity * price) / total_qty
                } else {
                    price
                };
                entry.quantity = total_qty;
                entry.value = total_qty * price;
                entry.margin = entry.value / self.config.leverage;
            }
            OrderSide::Sell => {
                entry.quantity = (entry.quantity - quantity).max(Decimal::ZERO);
                if entry.quantity > Decimal::ZERO {
                    entry.value = entry.quantity * price;
                    entry.margin = entry.value / self.config.leverage;
                } else {
                    entry.avg_price = Decimal::ZERO;
                    entry.value = Decimal::ZERO;
                    entry.margin = Decimal::ZERO;
                }
            }
        }

        self.update_drawdown();
    }

    pub fn close_position(&mut self, symbol: &Symbol, _exit_price: Decimal, pnl: Decimal) {
        self.positions.remove(symbol);
        self.cumulative_pnl += pnl;
        self.daily_pnl += pnl;
        self.daily_trade_count += 1;
        self.daily_volume += pnl.abs();
        self.update_drawdown();
        self.journal.record(RiskEvent {
            at: Utc::now(),
            kind: RiskEventKind::PositionClosed,
            symbol: Some(symbol.clone()),
            detail: format!("pnl={pnl}"),
        });
    }

    fn update_drawdown(&mut self) {
        let portfolio_value = self.portfolio_value();
        if portfolio_value > self.peak_portfolio_value {
            self.peak_portfolio_value = portfolio_value;
        }
        if self.peak_portfolio_value > Decimal::ZERO {
            self.current_drawdown = (self.peak_portfolio_value - portfolio_value) / self.peak_portfolio_value;
        }
    }

    pub fn portfolio_value(&self) -> Decimal {
        self.positions.values().map(|p| p.value).sum()
    }

    pub fn current_drawdown(&self) -> Decimal {
        self.current_drawdown
    }

    pub fn daily_pnl(&self) -> Decimal {
        self.daily_pnl
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn position_values(&self) -> HashMap<Symbol, Decimal> {
        self.positions.iter().map(|(symbol, pos)| (symbol.clone(), pos.value)).collect()
    }

    pub fn journal(&self) -> &RiskEventJournal {
        &self.journal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn symbol() -> Symbol {
        Symbol::new("ETH_USDC_PERP")
    }

    #[test]
    fn rejects_when_margin_after_exceeds_limit() {
        let mut manager = RiskManager::new(TradingConfig { leverage: dec!(1), ..TradingConfig::default() });
        let result = manager.check_order_risk(&symbol(), OrderSide::Buy, dec!(10), dec!(2000), None, Some(dec!(1000)));
        assert!(!result.approved);
        assert!(!result.violations.is_empty());
    }

    #[test]
    fn approves_small_order_within_margin() {
        let mut manager = RiskManager::new(TradingConfig::default());
        let result = manager.check_order_risk(&symbol(), OrderSide::Buy, dec!(0.01), dec!(2000), None, Some(dec!(100_000)));
        assert!(result.approved);
        assert!(result.stop_loss_price < dec!(2000));
        assert!(result.take_profit_price > dec!(2000));
    }

    #[test]
    fn rejects_daily_loss_limit_breach() {
        let mut manager = RiskManager::new(TradingConfig::default());
        manager.daily_pnl = dec!(-500);
        let result = manager.check_order_risk(&symbol(), OrderSide::Buy, dec!(0.001), dec!(2000), None, Some(dec!(1_000_000)));
        assert!(!result.approved);
    }

    #[test]
    fn close_position_updates_cumulative_pnl_and_removes_entry() {
        let mut manager = RiskManager::new(TradingConfig::default());
        manager.update_position(symbol(), OrderSide::Buy, dec!(1), dec!(2000));
        assert_eq!(manager.position_count(), 1);
        manager.close_position(&symbol(), dec!(2100), dec!(100));
        assert_eq!(manager.position_count(), 0);
        assert_eq!(manager.cumulative_pnl, dec!(100));
    }
}
