use crate::signal::Signal;
use chrono::{DateTime, Utc};
use derive_more::{Constructor, Display};
use helix_instrument::symbol::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Locally-generated, strictly monotonic order identifier tagged with the millisecond
/// timestamp it was minted at (spec §3.1, §4.D.1).
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Constructor,
)]
pub struct OrderId {
    pub sequence: u64,
    pub minted_at_ms: i64,
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.minted_at_ms, self.sequence)
    }
}

/// Monotonic [`OrderId`] generator, one per engine instance.
#[derive(Debug, Default)]
pub struct OrderIdGenerator {
    next: u64,
}

impl OrderIdGenerator {
    pub fn next(&mut self, now: DateTime<Utc>) -> OrderId {
        let sequence = self.next;
        self.next += 1;
        OrderId::new(sequence, now.timestamp_millis())
    }
}

/// Venue-assigned order identifier, present once an order has been submitted.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Constructor, Display,
)]
pub struct VenueOrderId(pub String);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
pub enum OrderSide {
    #[display("buy")]
    Buy,
    #[display("sell")]
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
pub enum OrderKind {
    Market,
    Limit,
    #[display("ioc")]
    ImmediateOrCancel,
    #[display("fok")]
    FillOrKill,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
pub enum TimeInForce {
    GoodTilCancel,
    ImmediateOrCancel,
    FillOrKill,
}

/// Non-terminal states are `Pending`/`Open`; `Filled`/`Cancelled`/`Rejected` are terminal and
/// never transition further (spec §3.1 Order invariants).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
pub enum OrderStatus {
    Pending,
    Open,
    Filled,
    Cancelled,
    Rejected,
    /// Sentinel used when a venue reports "order not found" (spec §4.A Failure model);
    /// the status-poll loop interprets three consecutive occurrences as an imputed fill.
    NotFound,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

/// A request to open (or reduce) a position, prior to venue submission.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct OrderRequestOpen {
    pub symbol: Symbol,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub reduce_only: bool,
    pub post_only: bool,
    /// The [`Signal`] that produced this request, carried through so stop/take-profit
    /// references remain attached to the resulting [`Order`] (spec §3.1 Order metadata).
    pub originating_signal: Option<Signal>,
}

/// Local order record, exclusively owned by the live trading engine for its instance
/// (spec §3.2 Ownership).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub venue_id: Option<VenueOrderId>,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub reduce_only: bool,
    pub post_only: bool,
    pub status: OrderStatus,
    pub filled_quantity: Decimal,
    pub commission: Decimal,
    pub originating_signal: Option<Signal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
    /// Consecutive "not found" responses from `get_order`; three strikes triggers the
    /// imputed-fill rule (spec §4.D Status poll loop).
    pub not_found_strikes: u8,
}

impl Order {
    pub fn new_open(id: OrderId, venue_id: VenueOrderId, request: OrderRequestOpen, now: DateTime<Utc>) -> Self {
        Self {
            id,
            venue_id: Some(venue_id),
            symbol: request.symbol,
            side: request.side,
            kind: request.kind,
            quantity: request.quantity,
            price: request.price,
            reduce_only: request.reduce_only,
            post_only: request.post_only,
            status: OrderStatus::Open,
            filled_quantity: Decimal::ZERO,
            commission: Decimal::ZERO,
            originating_signal: request.originating_signal,
            created_at: now,
            updated_at: now,
            filled_at: None,
            not_found_strikes: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Record another consecutive 404 from `get_order`, returning `true` once the
    /// triple-strike threshold is reached.
    pub fn strike_not_found(&mut self) -> bool {
        self.not_found_strikes = self.not_found_strikes.saturating_add(1);
        self.not_found_strikes >= 3
    }

    pub fn reset_not_found_strikes(&mut self) {
        self.not_found_strikes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_ids_are_strictly_monotonic() {
        let mut id_gen = OrderIdGenerator::default();
        let now = Utc::now();
        let a = id_gen.next(now);
        let b = id_gen.next(now);
        assert!(b.sequence > a.sequence);
    }

    #[test]
    fn triple_strike_threshold() {
        let mut order = Order::new_open(
            OrderId::new(0, 0),
            VenueOrderId::new("v1".to_string()),
            OrderRequestOpen::new(
                Symbol::new("ETH_USDC_PERP"),
                OrderSide::Buy,
                OrderKind::Limit,
                Decimal::ONE,
                Some(Decimal::ONE),
                false,
                false,
                None,
            ),
            Utc::now(),
        );

        assert!(!order.strike_not_found());
        assert!(!order.strike_not_found());
        assert!(order.strike_not_found());
    }
}
