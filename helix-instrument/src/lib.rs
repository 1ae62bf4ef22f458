#![warn(
    unused,
    clippy::cognitive_complexity,
    clippy::useless_let_if_seq,
    clippy::suspicious_operation_groupings,
    unused_lifetimes,
    unused_qualifications
)]

//! Core Exchange, Instrument and Asset data structures shared by every other crate in this
//! workspace, plus the symbol canonicalisation/translation contract each exchange adapter
//! implements.

use derive_more::Constructor;
use serde::{Deserialize, Serialize};

/// [`Asset`](asset::Asset) identity and indexing.
pub mod asset;

/// [`ExchangeId`](exchange::ExchangeId) identity and indexing.
pub mod exchange;

/// Dense index lookups ([`index::IndexedInstruments`]) over exchanges/assets/instruments.
pub mod index;

/// [`Instrument`](instrument::Instrument) identity, kind and specification.
pub mod instrument;

/// Canonical/venue symbol translation contract (see spec §3.1 / §4.A).
pub mod symbol;

/// The base and quote [`Asset`](asset::Asset) underlying an [`Instrument`](instrument::Instrument).
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Constructor)]
pub struct Underlying<AssetKey> {
    pub base: AssetKey,
    pub quote: AssetKey,
}

impl<AssetKey> Underlying<AssetKey> {
    pub fn map_asset_key<NewAssetKey, FnMap>(self, mut map: FnMap) -> Underlying<NewAssetKey>
    where
        FnMap: FnMut(AssetKey) -> NewAssetKey,
    {
        Underlying {
            base: map(self.base),
            quote: map(self.quote),
        }
    }
}
