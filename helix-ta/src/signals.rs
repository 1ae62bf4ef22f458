//! Signal generators built on top of the raw [`crate::patterns`] primitives.

use crate::patterns::{crossover, Cross};
use rust_decimal::Decimal;

/// Directional trade signal emitted by a [`CrossOverSignal`] generator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
}

/// Stateful moving-average crossover signal generator.
///
/// Tracks the previously observed `(fast, slow)` pair so that each call to
/// [`CrossOverSignal::update`] can detect a crossover against the prior bar.
/// The first update never emits a signal since there is no prior pair to
/// compare against.
#[derive(Debug, Default, Clone)]
pub struct CrossOverSignal {
    prev: Option<(Decimal, Decimal)>,
}

impl CrossOverSignal {
    pub fn new() -> Self {
        Self { prev: None }
    }

    pub fn update(&mut self, fast: Decimal, slow: Decimal) -> Option<Signal> {
        let signal = self.prev.and_then(|(prev_fast, prev_slow)| {
            crossover(prev_fast, prev_slow, fast, slow).map(|cross| match cross {
                Cross::Above => Signal::Buy,
                Cross::Below => Signal::Sell,
            })
        });

        self.prev = Some((fast, slow));
        signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn no_signal_on_first_update() {
        let mut cross = CrossOverSignal::new();
        assert_eq!(cross.update(dec!(1), dec!(2)), None);
    }

    #[test]
    fn detects_cross_above_then_below() {
        let mut cross = CrossOverSignal::new();
        assert_eq!(cross.update(dec!(1), dec!(2)), None);
        assert_eq!(cross.update(dec!(2), dec!(2)), None);
        assert_eq!(cross.update(dec!(3), dec!(2)), Some(Signal::Buy));
        assert_eq!(cross.update(dec!(2), dec!(3)), Some(Signal::Sell));
    }
}
