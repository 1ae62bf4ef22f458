use serde::{Deserialize, Serialize};

/// Identifies which side of an [`Instrument`](super::Instrument)'s underlying pair is used as
/// the quote asset for pricing and margin purposes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum InstrumentQuoteAsset {
    /// The instrument's `Underlying::quote` asset is used directly (eg/ a spot pair).
    UnderlyingQuote,
    /// The instrument's `Underlying::base` asset is used (inverse contracts).
    UnderlyingBase,
}
