use crate::instrument::kind::InstrumentKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum MarketDataInstrumentKind {
    Spot,
    Perpetual,
    Future,
    Option,
}

impl<AssetKey> From<&InstrumentKind<AssetKey>> for MarketDataInstrumentKind {
    fn from(value: &InstrumentKind<AssetKey>) -> Self {
        match value {
            InstrumentKind::Spot => MarketDataInstrumentKind::Spot,
            InstrumentKind::Perpetual(_) => MarketDataInstrumentKind::Perpetual,
            InstrumentKind::Future(_) => MarketDataInstrumentKind::Future,
            InstrumentKind::Option(_) => MarketDataInstrumentKind::Option,
        }
    }
}
