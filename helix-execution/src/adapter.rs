use crate::{
    balance::AssetBalance,
    error::ExecutionError,
    order::{Order, OrderRequestOpen, VenueOrderId},
    position::Position,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use helix_instrument::{asset::Asset, symbol::Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Exchange market metadata, one entry per canonical symbol (spec §4.A `get_markets`).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MarketInfo {
    pub base: Asset,
    pub quote: Asset,
    pub price_tick: Decimal,
    pub lot_size: Decimal,
    pub min_notional: Decimal,
    pub price_precision: u32,
    pub quantity_precision: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Ticker {
    pub symbol: Symbol,
    pub last_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub volume: Decimal,
    pub time_exchange: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DepthLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Depth {
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

/// A single `(open_ms, open, high, low, close, volume)` kline row, oldest-to-newest ordering
/// guaranteed by [`ExchangeAdapter::get_klines`].
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct Kline {
    pub open_time_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Uniform capability contract over heterogeneous exchanges (spec §4.A). Every call that can
/// block on I/O is `async`; each of the three concrete adapters (`EdgeAdapter`,
/// `CoastalAdapter`, `OnchainAdapter`) implements this with its own wire format and signing
/// regime while sharing the same caller-facing shape.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn id(&self) -> &'static str;

    /// Recognise a symbol already in this adapter's native form and return it unchanged,
    /// otherwise translate any supported shape into it (spec §4.A Symbol translation).
    fn canonicalise(&self, symbol: &Symbol) -> Symbol;

    async fn get_markets(&self) -> Result<Vec<(Symbol, MarketInfo)>, ExecutionError>;
    async fn get_ticker(&self, symbol: &Symbol) -> Result<Ticker, ExecutionError>;
    async fn get_depth(&self, symbol: &Symbol, limit: u32) -> Result<Depth, ExecutionError>;
    async fn get_klines(
        &self,
        symbol: &Symbol,
        interval: &str,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Kline>, ExecutionError>;
    async fn get_server_time(&self) -> Result<i64, ExecutionError>;
    async fn get_balance(&self) -> Result<Vec<AssetBalance<Asset>>, ExecutionError>;
    async fn get_positions(&self, symbol: Option<&Symbol>) -> Result<Vec<Position>, ExecutionError>;

    async fn execute_order(&self, request: OrderRequestOpen) -> Result<Order, ExecutionError>;
    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> Result<Vec<Order>, ExecutionError>;
    async fn get_order(&self, id: &VenueOrderId, symbol: &Symbol) -> Result<Order, ExecutionError>;
    async fn cancel_order(&self, symbol: &Symbol, id: &VenueOrderId) -> Result<(), ExecutionError>;
    async fn cancel_all_orders(&self, symbol: Option<&Symbol>) -> Result<(), ExecutionError>;

    /// Whether this adapter natively exposes `get_positions` + a `close_position` call
    /// (as opposed to requiring a synthetic reduce-only market order to flatten). Used by
    /// the grid engine's stop procedure in place of a runtime venue-name check.
    fn supports_native_positions(&self) -> bool {
        true
    }

    /// For adapters whose stop procedure must avoid a graph/indexer call during teardown
    /// (the on-chain adapter), the `(pair_id, trade_index)` tuples captured at order
    /// placement time, keyed by venue order id. Empty for adapters that don't need this.
    fn cached_close_refs(&self) -> Vec<(VenueOrderId, (String, u64))> {
        Vec::new()
    }

    /// Closes a single trade identified by a `cached_close_refs` entry, for adapters that
    /// cannot query `get_positions` during teardown. Default errs; only an adapter that
    /// returns non-empty `cached_close_refs` needs to override this.
    async fn close_cached_ref(&self, venue_id: &VenueOrderId) -> Result<(), ExecutionError> {
        Err(ExecutionError::NotFound(venue_id.0.clone()))
    }
}
