use derive_more::{Constructor, Display};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Unique identifier for an [`Asset`] within an [`IndexedInstruments`](crate::index::IndexedInstruments)
/// collection.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Constructor,
)]
pub struct AssetIndex(pub usize);

impl AssetIndex {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Canonical identifier for a settlement/quote/base asset (eg/ `usdc`, `btc`), independent of
/// any particular exchange's naming convention.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Constructor, Display,
)]
pub struct AssetNameInternal(pub SmolStr);

impl<S> From<S> for AssetNameInternal
where
    S: Into<SmolStr>,
{
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

/// Asset traded or settled on an exchange.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Constructor)]
pub struct Asset {
    pub name_internal: AssetNameInternal,
    pub name_exchange: SmolStr,
}

impl Asset {
    pub fn new_from_exchange<S>(name_exchange: S) -> Self
    where
        S: Into<SmolStr>,
    {
        let name_exchange = name_exchange.into();
        Self {
            name_internal: AssetNameInternal(name_exchange.to_lowercase().into()),
            name_exchange,
        }
    }
}
