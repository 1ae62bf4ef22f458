use chrono::{DateTime, Utc};
use helix_execution::order::{OrderSide, VenueOrderId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How the ladder's sides are assigned (spec §4.F Ladder construction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum GridMode {
    LongOnly,
    ShortOnly,
    LongShort,
}

/// Per-rung state machine (spec §4.F State machine per rung):
/// `Idle -> Pending -> HandlingFill -> Closing -> Idle`, with `Placing` locking a rung
/// against re-selection by the monitor while an order submission is in flight, and
/// `Cancelled`/`Error` as the off-ramp back to `Idle` after a cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum GridLevelStatus {
    Idle,
    Placing,
    Pending,
    HandlingFill,
    Closing,
    Cancelled,
    Error,
}

/// One ladder rung. `index` is stable for the instance's lifetime and used to find the
/// adjacent rung on a fill (spec §4.F Fill → paired close, step 3).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GridLevel {
    pub index: usize,
    pub price: Decimal,
    pub quantity: Decimal,
    pub side: OrderSide,
    pub status: GridLevelStatus,
    pub order_id: Option<VenueOrderId>,
    pub filled_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl GridLevel {
    /// `idle` rungs with a cooldown timestamp still in the future are skipped by the monitor
    /// (spec §4.F Additional safety transitions).
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        matches!(self.cooldown_until, Some(until) if until > now)
    }
}

/// Build the `N+1`-rung ladder: `price_i = lower + i*(upper-lower)/N`,
/// `quantity = investment_per_grid * leverage / price_i` (spec §4.F Ladder construction).
/// Side assignment is mode-dependent; for `long_short`, rungs below `current_price` are BUYs
/// and rungs above are SELLs. Callers round prices/quantities to venue precision once, at
/// start time, via [`helix_execution::precision::PrecisionRule`] before placing any order.
pub fn build_ladder(
    lower: Decimal,
    upper: Decimal,
    grid_count: u32,
    investment_per_grid: Decimal,
    leverage: Decimal,
    mode: GridMode,
    current_price: Decimal,
) -> Vec<GridLevel> {
    let spacing = (upper - lower) / Decimal::from(grid_count);
    (0..=grid_count)
        .map(|i| {
            let price = lower + Decimal::from(i) * spacing;
            let quantity = if price.is_zero() { Decimal::ZERO } else { investment_per_grid * leverage / price };
            let side = match mode {
                GridMode::LongOnly => OrderSide::Buy,
                GridMode::ShortOnly => OrderSide::Sell,
                GridMode::LongShort => {
                    if price < current_price {
                        OrderSide::Buy
                    } else {
                        OrderSide::Sell
                    }
                }
            };
            GridLevel {
                index: i as usize,
                price,
                quantity,
                side,
                status: GridLevelStatus::Idle,
                order_id: None,
                filled_at: None,
                cooldown_until: None,
            }
        })
        .collect()
}

/// Grid spacing, `(upper - lower) / grid_count`; used both at ladder construction and by the
/// paired-close fallback when no adjacent rung exists.
pub fn spacing(lower: Decimal, upper: Decimal, grid_count: u32) -> Decimal {
    (upper - lower) / Decimal::from(grid_count)
}

/// The adjacent next rung *by price* on the opposing side of a fill: the rung directly above
/// for a BUY fill, directly below for a SELL fill (spec §4.F Fill → paired close, step 3).
pub fn adjacent_rung(levels: &[GridLevel], filled_index: usize, side: OrderSide) -> Option<usize> {
    let filled_price = levels.get(filled_index)?.price;
    match side {
        OrderSide::Buy => levels
            .iter()
            .filter(|level| level.price > filled_price)
            .min_by_key(|level| level.price)
            .map(|level| level.index),
        OrderSide::Sell => levels
            .iter()
            .filter(|level| level.price < filled_price)
            .max_by_key(|level| level.price)
            .map(|level| level.index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn ladder_has_n_plus_one_rungs_with_expected_spacing() {
        let levels = build_ladder(dec!(1900), dec!(2100), 10, dec!(100), dec!(5), GridMode::LongShort, dec!(2000));
        assert_eq!(levels.len(), 11);
        assert_eq!(levels[0].price, dec!(1900));
        assert_eq!(levels[10].price, dec!(2100));
        assert_eq!(levels[5].price, dec!(2000));
    }

    #[test]
    fn long_short_splits_sides_around_current_price() {
        let levels = build_ladder(dec!(1900), dec!(2100), 10, dec!(100), dec!(5), GridMode::LongShort, dec!(2000));
        assert_eq!(levels[4].side, OrderSide::Buy);
        assert_eq!(levels[5].side, OrderSide::Sell);
        assert_eq!(levels[6].side, OrderSide::Sell);
    }

    #[test]
    fn long_only_is_all_buys_and_short_only_is_all_sells() {
        let long_only = build_ladder(dec!(1900), dec!(2100), 4, dec!(100), dec!(5), GridMode::LongOnly, dec!(2000));
        assert!(long_only.iter().all(|l| l.side == OrderSide::Buy));

        let short_only = build_ladder(dec!(1900), dec!(2100), 4, dec!(100), dec!(5), GridMode::ShortOnly, dec!(2000));
        assert!(short_only.iter().all(|l| l.side == OrderSide::Sell));
    }

    #[test]
    fn adjacent_rung_for_a_buy_fill_is_the_next_rung_up() {
        let levels = build_ladder(dec!(1900), dec!(2100), 10, dec!(100), dec!(5), GridMode::LongShort, dec!(2000));
        let next = adjacent_rung(&levels, 4, OrderSide::Buy).unwrap();
        assert_eq!(levels[next].price, dec!(2000));
    }

    #[test]
    fn adjacent_rung_for_a_sell_fill_is_the_next_rung_down() {
        let levels = build_ladder(dec!(1900), dec!(2100), 10, dec!(100), dec!(5), GridMode::LongShort, dec!(2000));
        let next = adjacent_rung(&levels, 6, OrderSide::Sell).unwrap();
        assert_eq!(levels[next].price, dec!(2000));
    }

    #[test]
    fn top_rung_has_no_rung_above_it() {
        let levels = build_ladder(dec!(1900), dec!(2100), 10, dec!(100), dec!(5), GridMode::LongShort, dec!(2000));
        assert!(adjacent_rung(&levels, 10, OrderSide::Buy).is_none());
    }
}
