use crate::instrument::kind::{
    future::FutureContract, option::OptionContract, perpetual::PerpetualContract,
};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// `FutureContract` specification.
pub mod future;

/// `OptionContract` specification.
pub mod option;

/// `PerpetualContract` specification.
pub mod perpetual;

/// Discriminated union over every [`Instrument`](super::Instrument) kind tradable in this
/// workspace. Only [`InstrumentKind::Perpetual`] is exercised by the live trading engine; the
/// others are retained so that market-data and symbol-translation code is not artificially
/// narrowed to a single product type.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstrumentKind<AssetKey> {
    Spot,
    Perpetual(PerpetualContract<AssetKey>),
    Future(FutureContract<AssetKey>),
    Option(OptionContract<AssetKey>),
}

impl<AssetKey> Display for InstrumentKind<AssetKey> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                InstrumentKind::Spot => "spot",
                InstrumentKind::Perpetual(_) => "perpetual",
                InstrumentKind::Future(_) => "future",
                InstrumentKind::Option(_) => "option",
            }
        )
    }
}
