use crate::{
    asset::{Asset, AssetIndex},
    exchange::{ExchangeId, ExchangeIndex},
    index::error::IndexError,
    instrument::{Instrument, InstrumentIndex},
};
use std::collections::HashMap;

/// Index lookup failures.
pub mod error;

/// Resolves the exchange/asset/instrument identifiers used throughout an engine instance's
/// lifetime into dense, zero-based indices, so that hot-path maps can key on a `usize` rather
/// than a `SmolStr` comparison. Built once at startup from the instruments a strategy registers.
#[derive(Debug, Clone, Default)]
pub struct IndexedInstruments {
    exchanges: Vec<ExchangeId>,
    assets: Vec<Asset>,
    instruments: Vec<Instrument<ExchangeIndex, AssetIndex>>,
    exchange_lookup: HashMap<ExchangeId, ExchangeIndex>,
    asset_lookup: HashMap<Asset, AssetIndex>,
    instrument_lookup: HashMap<(ExchangeIndex, String), InstrumentIndex>,
}

impl IndexedInstruments {
    pub fn exchanges(&self) -> &[ExchangeId] {
        &self.exchanges
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn instruments(&self) -> &[Instrument<ExchangeIndex, AssetIndex>] {
        &self.instruments
    }

    pub fn find_exchange_index(&self, exchange: ExchangeId) -> Result<ExchangeIndex, IndexError> {
        self.exchange_lookup
            .get(&exchange)
            .copied()
            .ok_or_else(|| IndexError::ExchangeIndex(exchange.as_str().to_string()))
    }

    pub fn find_asset_index(&self, asset: &Asset) -> Result<AssetIndex, IndexError> {
        self.asset_lookup
            .get(asset)
            .copied()
            .ok_or_else(|| IndexError::AssetIndex(asset.name_internal.to_string()))
    }

    pub fn find_instrument_index(
        &self,
        exchange: ExchangeIndex,
        name_exchange: &str,
    ) -> Result<InstrumentIndex, IndexError> {
        self.instrument_lookup
            .get(&(exchange, name_exchange.to_string()))
            .copied()
            .ok_or_else(|| IndexError::InstrumentIndex(name_exchange.to_string()))
    }

    pub fn push_exchange(&mut self, exchange: ExchangeId) -> ExchangeIndex {
        if let Some(index) = self.exchange_lookup.get(&exchange) {
            return *index;
        }
        let index = ExchangeIndex(self.exchanges.len());
        self.exchanges.push(exchange);
        self.exchange_lookup.insert(exchange, index);
        index
    }

    pub fn push_asset(&mut self, asset: Asset) -> AssetIndex {
        if let Some(index) = self.asset_lookup.get(&asset) {
            return *index;
        }
        let index = AssetIndex(self.assets.len());
        self.assets.push(asset.clone());
        self.asset_lookup.insert(asset, index);
        index
    }

    pub fn push_instrument(
        &mut self,
        exchange: ExchangeIndex,
        instrument: Instrument<ExchangeIndex, AssetIndex>,
    ) -> InstrumentIndex {
        let index = InstrumentIndex(self.instruments.len());
        self.instrument_lookup.insert(
            (exchange, instrument.name_exchange.as_str().to_string()),
            index,
        );
        self.instruments.push(instrument);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pushing_same_exchange_twice_is_idempotent() {
        let mut indexed = IndexedInstruments::default();
        let first = indexed.push_exchange(ExchangeId::BinanceFuturesUsd);
        let second = indexed.push_exchange(ExchangeId::BinanceFuturesUsd);
        assert_eq!(first, second);
        assert_eq!(indexed.exchanges().len(), 1);
    }
}
