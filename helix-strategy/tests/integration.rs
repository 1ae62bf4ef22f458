//! End-to-end grid instance scenarios against a stub exchange adapter.

use async_trait::async_trait;
use chrono::Utc;
use helix_execution::{
    adapter::{Depth, ExchangeAdapter, Kline, MarketInfo, Ticker},
    balance::AssetBalance,
    error::ExecutionError,
    order::{Order, OrderId, OrderRequestOpen, OrderStatus, VenueOrderId},
    position::Position,
};
use helix_instrument::{asset::Asset, symbol::Symbol};
use helix_strategy::grid::{GridInstance, GridInstanceConfig, GridLevelStatus, GridMode};
use parking_lot::Mutex;
use rust_decimal_macros::dec;

#[derive(Default)]
struct StubAdapter {
    orders: Mutex<Vec<Order>>,
    next_seq: Mutex<u64>,
    cancelled: Mutex<Vec<VenueOrderId>>,
}

impl StubAdapter {
    /// Marks an order filled without removing it from the order book, so a later
    /// `get_order` call (after it has dropped out of `get_open_orders`) still resolves.
    fn mark_filled(&self, venue_id: &VenueOrderId, price: rust_decimal::Decimal) {
        let mut orders = self.orders.lock();
        if let Some(order) = orders.iter_mut().find(|o| o.venue_id.as_ref() == Some(venue_id)) {
            order.status = OrderStatus::Filled;
            order.price = Some(price);
        }
    }

    fn remove_from_open(&self, venue_id: &VenueOrderId) {
        // Simulate the venue dropping a filled order from the open-orders listing while it
        // remains queryable individually via get_order.
        self.orders.lock().retain(|o| o.venue_id.as_ref() != Some(venue_id) || o.status != OrderStatus::Filled);
    }
}

#[async_trait]
impl ExchangeAdapter for StubAdapter {
    fn id(&self) -> &'static str {
        "stub"
    }
    fn canonicalise(&self, symbol: &Symbol) -> Symbol {
        symbol.clone()
    }
    async fn get_markets(&self) -> Result<Vec<(Symbol, MarketInfo)>, ExecutionError> {
        Ok(Vec::new())
    }
    async fn get_ticker(&self, _symbol: &Symbol) -> Result<Ticker, ExecutionError> {
        unimplemented!()
    }
    async fn get_depth(&self, _symbol: &Symbol, _limit: u32) -> Result<Depth, ExecutionError> {
        unimplemented!()
    }
    async fn get_klines(&self, _symbol: &Symbol, _interval: &str, _start_ms: Option<i64>, _end_ms: Option<i64>, _limit: u32) -> Result<Vec<Kline>, ExecutionError> {
        Ok(Vec::new())
    }
    async fn get_server_time(&self) -> Result<i64, ExecutionError> {
        Ok(0)
    }
    async fn get_balance(&self) -> Result<Vec<AssetBalance<Asset>>, ExecutionError> {
        Ok(Vec::new())
    }
    async fn get_positions(&self, _symbol: Option<&Symbol>) -> Result<Vec<Position>, ExecutionError> {
        Ok(Vec::new())
    }
    async fn execute_order(&self, request: OrderRequestOpen) -> Result<Order, ExecutionError> {
        let mut seq = self.next_seq.lock();
        *seq += 1;
        let venue_id = VenueOrderId::new(format!("v{seq}"));
        let order = Order::new_open(OrderId::new(*seq, 0), venue_id, request, Utc::now());
        self.orders.lock().push(order.clone());
        Ok(order)
    }
    async fn get_open_orders(&self, _symbol: Option<&Symbol>) -> Result<Vec<Order>, ExecutionError> {
        Ok(self.orders.lock().iter().filter(|o| !o.is_terminal()).cloned().collect())
    }
    async fn get_order(&self, id: &VenueOrderId, _symbol: &Symbol) -> Result<Order, ExecutionError> {
        self.orders
            .lock()
            .iter()
            .find(|o| o.venue_id.as_ref() == Some(id))
            .cloned()
            .ok_or_else(|| ExecutionError::NotFound(id.0.clone()))
    }
    async fn cancel_order(&self, _symbol: &Symbol, id: &VenueOrderId) -> Result<(), ExecutionError> {
        self.cancelled.lock().push(id.clone());
        self.orders.lock().retain(|o| o.venue_id.as_ref() != Some(id));
        Ok(())
    }
    async fn cancel_all_orders(&self, _symbol: Option<&Symbol>) -> Result<(), ExecutionError> {
        self.orders.lock().clear();
        Ok(())
    }
}

fn config() -> GridInstanceConfig {
    GridInstanceConfig::with_defaults(Symbol::new("ETH_USDC_PERP"), GridMode::LongShort, dec!(1900), dec!(2100), 10, dec!(100), dec!(5))
}

#[tokio::test]
async fn a_filled_rung_is_paired_with_a_reduce_only_close_and_then_realized() {
    let adapter = StubAdapter::default();
    let mut instance = GridInstance::new(config(), dec!(2000));
    instance.place_initial_orders(&adapter, dec!(2000)).await.unwrap();

    let buy_rung = instance.levels[4].clone();
    let buy_order_id = buy_rung.order_id.clone().unwrap();
    assert_eq!(buy_rung.status, GridLevelStatus::Pending);

    adapter.mark_filled(&buy_order_id, dec!(1980));
    adapter.remove_from_open(&buy_order_id);

    instance.monitor_tick(&adapter, dec!(1980)).await.unwrap();

    assert_eq!(instance.levels[4].status, GridLevelStatus::Closing);
    assert_eq!(instance.stats.total_trades, 1);
    assert_eq!(instance.stats.buy_count, 1);

    let close_id = adapter
        .orders
        .lock()
        .iter()
        .find(|o| o.reduce_only)
        .and_then(|o| o.venue_id.clone())
        .expect("paired close order was placed");

    adapter.mark_filled(&close_id, dec!(2000));
    adapter.remove_from_open(&close_id);

    instance.monitor_tick(&adapter, dec!(2000)).await.unwrap();

    // the parent rung is re-armed and immediately re-placed rather than left idle.
    assert_eq!(instance.levels[4].status, GridLevelStatus::Pending);
    assert!(instance.levels[4].order_id.is_some());
    assert!(instance.stats.total_profit > dec!(0));
}

#[tokio::test]
async fn daily_loss_limit_stops_the_instance_and_cancels_open_orders() {
    let adapter = StubAdapter::default();
    let mut instance = GridInstance::new(config(), dec!(2000));
    instance.place_initial_orders(&adapter, dec!(2000)).await.unwrap();
    assert!(!adapter.orders.lock().is_empty());

    instance.stats.daily_realized_pnl = -instance.config.daily_loss_limit() - dec!(1);
    let outcome = instance.monitor_tick(&adapter, dec!(2000)).await;

    assert!(matches!(outcome, Err(helix_strategy::StrategyError::SelfStopped(_))));
    assert!(!instance.running);
    assert!(adapter.orders.lock().iter().all(|o| o.is_terminal()) || adapter.orders.lock().is_empty());
}

#[tokio::test]
async fn stop_liquidates_residual_positions_on_native_adapters() {
    let adapter = StubAdapter::default();
    let mut instance = GridInstance::new(config(), dec!(2000));
    instance.stop(&adapter).await.unwrap();
    assert!(!instance.running);
}
