use derive_more::{Constructor, Display};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Canonical [`Instrument`](super::Instrument) name - the form a strategy registers a symbol
/// under, and the key the live engine uses for its order/position/balance maps. Produced once
/// at instrument construction time and never re-derived from exchange payloads.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Constructor, Display,
)]
pub struct InstrumentNameInternal(pub SmolStr);

impl InstrumentNameInternal {
    pub fn new_from_exchange<S>(name_exchange: S) -> Self
    where
        S: Into<SmolStr>,
    {
        Self(name_exchange.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl<S> From<S> for InstrumentNameInternal
where
    S: Into<SmolStr>,
{
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

/// Venue-native [`Instrument`](super::Instrument) name - the exact string submitted in order
/// requests and returned in exchange payloads (eg/ `ETH_USDC_PERP`, `ETH-USDT-SWAP`).
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Constructor, Display,
)]
pub struct InstrumentNameExchange(pub SmolStr);

impl InstrumentNameExchange {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl<S> From<S> for InstrumentNameExchange
where
    S: Into<SmolStr>,
{
    fn from(value: S) -> Self {
        Self(value.into())
    }
}
