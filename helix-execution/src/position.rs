use chrono::{DateTime, Utc};
use helix_instrument::symbol::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Side a reduce-only close order must take to flatten a position with this side.
    pub fn closing_order_side(self) -> crate::order::OrderSide {
        match self {
            PositionSide::Long => crate::order::OrderSide::Sell,
            PositionSide::Short => crate::order::OrderSide::Buy,
        }
    }
}

/// Position ledger entry, keyed by [`Symbol`] (spec §3.1 Position). `quantity` is always
/// positive; `side` carries direction. The entity is deleted, never zeroed, once quantity
/// reaches zero (spec invariant).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Position {
    pub symbol: Symbol,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn new(symbol: Symbol, side: PositionSide, quantity: Decimal, entry_price: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            symbol,
            side,
            quantity,
            entry_price,
            mark_price: entry_price,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Leveraged percentage PnL (spec §4.D Position monitor loop):
    /// LONG: `((px - entry) / entry) * leverage`, SHORT: `((entry - px) / entry) * leverage`.
    pub fn leveraged_pnl_pct(&self, mark_price: Decimal, leverage: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        let raw = match self.side {
            PositionSide::Long => (mark_price - self.entry_price) / self.entry_price,
            PositionSide::Short => (self.entry_price - mark_price) / self.entry_price,
        };
        raw * leverage
    }

    pub fn update_mark(&mut self, mark_price: Decimal, leverage: Decimal) {
        self.mark_price = mark_price;
        self.unrealized_pnl = self.leveraged_pnl_pct(mark_price, leverage) * self.entry_price * self.quantity
            / leverage.max(Decimal::ONE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn forced_reduce_only_close_threshold() {
        // spec §8 scenario 4: LONG 0.1 @ 2000, mark 1960, leverage 50 -> -100% pnl
        let position = Position::new(Symbol::new("ETH_USDC_PERP"), PositionSide::Long, dec!(0.1), dec!(2000), Utc::now());
        let pnl_pct = position.leveraged_pnl_pct(dec!(1960), dec!(50));
        assert_eq!(pnl_pct, dec!(-1.0));
    }
}
