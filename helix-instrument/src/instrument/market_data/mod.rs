use crate::instrument::{market_data::kind::MarketDataInstrumentKind, name::InstrumentNameInternal};
use serde::{Deserialize, Serialize};

/// Kind discriminator for a [`MarketDataInstrument`].
pub mod kind;

/// Pared-down view of an [`Instrument`](super::Instrument) carrying only what is needed to
/// subscribe to a market-data feed (base/quote name and product kind) - the live engine never
/// needs the full instrument specification just to open a kline stream.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct MarketDataInstrument {
    pub base: InstrumentNameInternal,
    pub quote: InstrumentNameInternal,
    pub kind: MarketDataInstrumentKind,
}
