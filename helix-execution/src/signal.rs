use derive_more::Constructor;
use helix_instrument::symbol::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Output of a strategy for a single symbol (spec §3.1 Signal, §6.1 Strategy contract). The
/// engine ignores [`SignalAction::Hold`] and otherwise resolves a `Signal` into an
/// [`crate::order::OrderRequestOpen`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Signal {
    pub symbol: Symbol,
    pub action: SignalAction,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    /// Confidence in `[0, 1]`; not enforced at construction, validated by the caller.
    pub confidence: Decimal,
    pub rationale: String,
}

impl Signal {
    pub fn is_actionable(&self) -> bool {
        !matches!(self.action, SignalAction::Hold)
    }
}
