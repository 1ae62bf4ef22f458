use helix_instrument::symbol::Symbol;
use parking_lot::RwLock;
use rust_decimal::{Decimal, RoundingStrategy};
use std::{collections::HashMap, time::{Duration, Instant}};

/// Venue rounding rules for a single symbol: quantity is floored to `lot_size`, price is
/// rounded to `tick_size` (spec §4.A Symbol and precision translation).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrecisionRule {
    pub lot_size: Decimal,
    pub tick_size: Decimal,
    pub min_notional: Decimal,
}

impl PrecisionRule {
    pub fn round_quantity(&self, quantity: Decimal) -> Decimal {
        if self.lot_size.is_zero() {
            return quantity;
        }
        (quantity / self.lot_size).floor() * self.lot_size
    }

    pub fn round_price(&self, price: Decimal) -> Decimal {
        if self.tick_size.is_zero() {
            return price;
        }
        (price / self.tick_size).round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven) * self.tick_size
    }
}

const CACHE_TTL: Duration = Duration::from_secs(3600);

struct CacheEntry {
    rule: PrecisionRule,
    fetched_at: Instant,
}

/// Read-mostly cache of venue precision rules, refreshed once per hour per symbol
/// (spec §4.A: "rounding rules are queried once per symbol and cached for one hour").
#[derive(Default)]
pub struct PrecisionCache {
    entries: RwLock<HashMap<Symbol, CacheEntry>>,
}

impl PrecisionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &Symbol) -> Option<PrecisionRule> {
        let entries = self.entries.read();
        entries.get(symbol).and_then(|entry| {
            if entry.fetched_at.elapsed() < CACHE_TTL {
                Some(entry.rule)
            } else {
                None
            }
        })
    }

    pub fn put(&self, symbol: Symbol, rule: PrecisionRule) {
        self.entries.write().insert(
            symbol,
            CacheEntry {
                rule,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Drop a stale entry, forcing the next lookup to refetch. Invoked when an adapter call
    /// fails with `UnknownSymbol`, in case venue listings changed underneath the cache.
    pub fn invalidate(&self, symbol: &Symbol) {
        self.entries.write().remove(symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn floors_quantity_to_lot_size() {
        let rule = PrecisionRule {
            lot_size: dec!(0.001),
            tick_size: dec!(0.01),
            min_notional: dec!(5),
        };
        assert_eq!(rule.round_quantity(dec!(0.03125)), dec!(0.031));
    }

    #[test]
    fn cache_expires_after_ttl() {
        let cache = PrecisionCache::new();
        let symbol = Symbol::new("ETH_USDC_PERP");
        assert!(cache.get(&symbol).is_none());
        cache.put(
            symbol.clone(),
            PrecisionRule { lot_size: dec!(0.001), tick_size: dec!(0.01), min_notional: dec!(5) },
        );
        assert!(cache.get(&symbol).is_some());
        cache.invalidate(&symbol);
        assert!(cache.get(&symbol).is_none());
    }
}
