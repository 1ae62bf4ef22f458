use chrono::{DateTime, Utc};
use derive_more::Constructor;
use helix_instrument::symbol::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use helix_execution::order::{OrderId, OrderSide, VenueOrderId};

/// Immutable trade record persisted once per fill (spec §4.D Fill handling, step 3).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct TradeRecord {
    pub trade_id: String,
    pub order_id: OrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub commission: Decimal,
    pub commission_asset: String,
    pub is_maker: bool,
    pub ts: DateTime<Utc>,
}

/// Portfolio-level snapshot persisted by the ~60s snapshot loop (spec §4.D Snapshot loop).
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct PortfolioSnapshot {
    pub at: DateTime<Utc>,
    pub cash: Decimal,
    pub position_value: Decimal,
    pub total_value: Decimal,
    pub daily_pnl: Decimal,
    pub daily_return_pct: Decimal,
}
