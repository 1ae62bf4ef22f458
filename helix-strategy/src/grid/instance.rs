//! Per-instance grid trading state machine (spec §4.F). A [`GridInstance`] owns one ladder
//! for one symbol; it holds no task handle of its own — the embedding engine drives
//! [`GridInstance::monitor_tick`] on its own schedule and is responsible for cancelling that
//! schedule (with the spec's 2-second grace) before calling [`GridInstance::stop`].

use crate::error::StrategyError;
use crate::grid::levels::{adjacent_rung, build_ladder, spacing, GridLevel, GridLevelStatus, GridMode};
use chrono::{DateTime, NaiveDate, Utc};
use helix_execution::{
    adapter::ExchangeAdapter,
    order::{OrderKind, OrderRequestOpen, OrderSide, OrderStatus, VenueOrderId},
};
use helix_instrument::symbol::Symbol;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{info, instrument, warn};

const FREEZE_DURATION: Duration = Duration::from_secs(60);
const IDLE_COOLDOWN_SECS: i64 = 2;
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF_UNIT: Duration = Duration::from_millis(120);

/// Tunables for one grid instance; defaults mirror the reference exchange's own conventions
/// (spec §4.F: 5 USDC min notional, 0.04%/side maker fee, 50%/30% loss limits).
#[derive(Debug, Clone)]
pub struct GridInstanceConfig {
    pub symbol: Symbol,
    pub mode: GridMode,
    pub lower: Decimal,
    pub upper: Decimal,
    pub grid_count: u32,
    pub investment_per_grid: Decimal,
    pub leverage: Decimal,
    pub maker_fee_rate: Decimal,
    pub min_notional: Decimal,
    pub stop_loss_pct: Decimal,
    pub daily_loss_limit_pct: Decimal,
}

impl GridInstanceConfig {
    pub fn with_defaults(
        symbol: Symbol,
        mode: GridMode,
        lower: Decimal,
        upper: Decimal,
        grid_count: u32,
        investment_per_grid: Decimal,
        leverage: Decimal,
    ) -> Self {
        Self {
            symbol,
            mode,
            lower,
            upper,
            grid_count,
            investment_per_grid,
            leverage,
            maker_fee_rate: Decimal::new(4, 4),
            min_notional: Decimal::from(5),
            stop_loss_pct: Decimal::new(50, 2),
            daily_loss_limit_pct: Decimal::new(30, 2),
        }
    }

    pub fn total_investment(&self) -> Decimal {
        self.investment_per_grid * Decimal::from(self.grid_count)
    }

    pub fn daily_loss_limit(&self) -> Decimal {
        self.total_investment() * self.daily_loss_limit_pct
    }

    pub fn stop_loss_threshold(&self) -> Decimal {
        self.total_investment() * self.stop_loss_pct
    }

    fn spacing(&self) -> Decimal {
        spacing(self.lower, self.upper, self.grid_count)
    }
}

/// Running bookkeeping, mirrored into the risk manager / persistence sink by the embedding
/// engine, not by the grid instance itself.
#[derive(Debug, Clone, Default)]
pub struct GridStats {
    pub total_trades: u64,
    pub buy_count: u64,
    pub sell_count: u64,
    pub total_profit: Decimal,
    pub total_fees: Decimal,
    pub peak_profit: Decimal,
    pub max_drawdown: Decimal,
    pub current_position_value: Decimal,
    pub daily_realized_pnl: Decimal,
}

/// Entry in the closing-orders registry: the paired reduce-only close for a rung that has
/// filled (spec §4.F Fill → paired close, step 5).
#[derive(Debug, Clone)]
struct ClosingOrder {
    parent_index: usize,
    open_level_price: Decimal,
    side: OrderSide,
    quantity: Decimal,
    open_price: Decimal,
}

fn pending_close_id(parent_index: usize, attempt_at: DateTime<Utc>) -> VenueOrderId {
    VenueOrderId::new(format!("_no_oid_{parent_index}_{}", attempt_at.timestamp_nanos_opt().unwrap_or_default()))
}

fn is_pending_close_id(id: &VenueOrderId) -> bool {
    id.0.starts_with("_no_oid_")
}

/// One grid ladder for one symbol, including its state machine, closing-order registry and
/// PnL/boundary bookkeeping (spec §4.F entire section).
pub struct GridInstance {
    pub config: GridInstanceConfig,
    pub levels: Vec<GridLevel>,
    pub stats: GridStats,
    pub running: bool,
    closing_orders: HashMap<VenueOrderId, ClosingOrder>,
    last_reset_date: NaiveDate,
    freeze_until: Option<DateTime<Utc>>,
}

impl GridInstance {
    pub fn new(config: GridInstanceConfig, current_price: Decimal) -> Self {
        let levels = build_ladder(
            config.lower,
            config.upper,
            config.grid_count,
            config.investment_per_grid,
            config.leverage,
            config.mode,
            current_price,
        );
        Self {
            config,
            levels,
            stats: GridStats::default(),
            running: false,
            closing_orders: HashMap::new(),
            last_reset_date: Utc::now().date_naive(),
            freeze_until: None,
        }
    }

    /// Rounds every rung's price/quantity to venue precision, once, at start time
    /// (spec §4.F Ladder construction: "rounded to venue precision at start time, once").
    pub fn apply_precision(&mut self, rule: &helix_execution::precision::PrecisionRule) {
        for level in &mut self.levels {
            level.price = rule.round_price(level.price);
            level.quantity = rule.round_quantity(level.quantity);
        }
    }

    fn is_frozen(&self, now: DateTime<Utc>) -> bool {
        matches!(self.freeze_until, Some(until) if until > now)
    }

    fn freeze(&mut self, now: DateTime<Utc>) {
        warn!(symbol = %self.config.symbol, "grid instance hit a rate limit, freezing new placements for 60s");
        self.freeze_until = Some(now + chrono::Duration::from_std(FREEZE_DURATION).unwrap());
    }

    fn reset_daily_pnl_if_new_day(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today != self.last_reset_date {
            self.stats.daily_realized_pnl = Decimal::ZERO;
            self.last_reset_date = today;
            info!(symbol = %self.config.symbol, marker = "RISK", "grid daily pnl reset");
        }
    }

    /// Spec §4.F Boundary protection: midnight reset plus the daily/total loss limits. Returns
    /// `true` (and has already called [`GridInstance::stop`]) if either limit was breached.
    async fn check_boundary(&mut self, adapter: &dyn ExchangeAdapter, now: DateTime<Utc>) -> bool {
        self.reset_daily_pnl_if_new_day(now);

        if self.stats.daily_realized_pnl < -self.config.daily_loss_limit() {
            warn!(symbol = %self.config.symbol, marker = "RISK", pnl = %self.stats.daily_realized_pnl, "daily loss limit breached, stopping grid instance");
            let _ = self.stop(adapter).await;
            return true;
        }
        if self.stats.total_profit < -self.config.stop_loss_threshold() {
            warn!(symbol = %self.config.symbol, marker = "RISK", profit = %self.stats.total_profit, "total loss limit breached, stopping grid instance");
            let _ = self.stop(adapter).await;
            return true;
        }
        false
    }

    /// Spec §4.F Placement discipline + §4.F Ladder construction side rules. Places (or
    /// re-places) the rung at `index` against the current market.
    #[instrument(skip(self, adapter), fields(symbol = %self.config.symbol, index))]
    async fn place_grid_order(
        &mut self,
        index: usize,
        adapter: &dyn ExchangeAdapter,
        current_price: Decimal,
    ) -> Result<(), StrategyError> {
        let now = Utc::now();
        if self.is_frozen(now) {
            return Ok(());
        }

        let (side, price, quantity) = {
            let level = &self.levels[index];
            (level.side, level.price, level.quantity)
        };

        // Never place a BUY at/above, or a SELL at/below, the last traded price - it would
        // cross the book and behave as a taker (spec §4.F Placement discipline).
        if current_price > Decimal::ZERO {
            let crosses = match side {
                OrderSide::Buy => price >= current_price,
                OrderSide::Sell => price <= current_price,
            };
            if crosses {
                self.levels[index].status = GridLevelStatus::Idle;
                return Ok(());
            }
        }

        if quantity * price < self.config.min_notional {
            warn!(marker = "ORDER", "grid order value below venue minimum notional, skipping");
            self.levels[index].status = GridLevelStatus::Error;
            return Ok(());
        }

        // Crash-recovery idempotence: reuse a same-side, non-reduce-only open order already
        // within half a grid's spacing of this rung instead of placing a duplicate.
        if let Ok(open_orders) = adapter.get_open_orders(Some(&self.config.symbol)).await {
            let half_spacing = self.config.spacing() / Decimal::TWO;
            if let Some(existing) = open_orders.iter().find(|order| {
                !order.reduce_only && order.side == side && (order.price.unwrap_or(Decimal::ZERO) - price).abs() <= half_spacing
            }) {
                if let Some(venue_id) = &existing.venue_id {
                    info!(marker = "ORDER", venue_id = %venue_id, "reusing existing open order for grid rung");
                    self.levels[index].order_id = Some(venue_id.clone());
                    self.levels[index].status = GridLevelStatus::Pending;
                    return Ok(());
                }
            }
        }

        self.levels[index].status = GridLevelStatus::Placing;
        let request = OrderRequestOpen::new(self.config.symbol.clone(), side, OrderKind::Limit, quantity, Some(price), false, false, None);
        match adapter.execute_order(request).await {
            Ok(order) => {
                info!(marker = "ORDER", side = %side, price = %price, "grid rung placed");
                self.levels[index].order_id = order.venue_id;
                self.levels[index].status = GridLevelStatus::Pending;
            }
            Err(helix_execution::error::ExecutionError::RateLimited) => {
                self.freeze(now);
                self.levels[index].status = GridLevelStatus::Error;
            }
            Err(error) => {
                warn!(marker = "ORDER", %error, "grid rung placement failed");
                self.levels[index].status = GridLevelStatus::Error;
            }
        }
        Ok(())
    }

    /// Spec §4.F: "given `(lower, upper, N, ...)`... place initial orders" - long_only/
    /// short_only place every rung, long_short places below-current as BUY, above-current
    /// as SELL (sides already baked into each [`GridLevel`] at construction).
    pub async fn place_initial_orders(&mut self, adapter: &dyn ExchangeAdapter, current_price: Decimal) -> Result<(), StrategyError> {
        for index in 0..self.levels.len() {
            self.place_grid_order(index, adapter, current_price).await?;
        }
        Ok(())
    }

    /// Spec §4.F Fill → paired close. Called once a rung's opening order is confirmed filled.
    async fn handle_fill(&mut self, index: usize, fill_price: Option<Decimal>, adapter: &dyn ExchangeAdapter) {
        {
            let level = &self.levels[index];
            if matches!(level.status, GridLevelStatus::HandlingFill | GridLevelStatus::Closing) {
                return;
            }
        }
        let now = Utc::now();
        self.levels[index].status = GridLevelStatus::HandlingFill;
        self.levels[index].filled_at = Some(now);

        let (side, price, quantity) = {
            let level = &self.levels[index];
            (level.side, level.price, level.quantity)
        };
        let base = fill_price.filter(|p| *p > Decimal::ZERO).unwrap_or(price);

        self.stats.total_trades += 1;
        match side {
            OrderSide::Buy => self.stats.buy_count += 1,
            OrderSide::Sell => self.stats.sell_count += 1,
        }
        self.stats.current_position_value += quantity * base;
        info!(marker = "TRADE", symbol = %self.config.symbol, %side, price = %base, qty = %quantity, "grid rung filled");

        let close_side = side.opposite();
        let close_price = adjacent_rung(&self.levels, index, side)
            .map(|next| self.levels[next].price)
            .unwrap_or_else(|| match side {
                OrderSide::Buy => base + self.config.spacing(),
                OrderSide::Sell => base - self.config.spacing(),
            });

        let mut venue_id = None;
        for attempt in 0..RETRY_ATTEMPTS {
            let request = OrderRequestOpen::new(self.config.symbol.clone(), close_side, OrderKind::Limit, quantity, Some(close_price), true, false, None);
            match adapter.execute_order(request).await {
                Ok(order) if order.venue_id.is_some() => {
                    venue_id = order.venue_id;
                    break;
                }
                _ => {
                    tokio::time::sleep(RETRY_BACKOFF_UNIT * (attempt + 1)).await;
                }
            }
        }

        let info = ClosingOrder { parent_index: index, open_level_price: price, side, quantity, open_price: base };
        let key = venue_id.unwrap_or_else(|| pending_close_id(index, now));
        self.closing_orders.insert(key, info);

        self.levels[index].order_id = None;
        self.levels[index].status = GridLevelStatus::Closing;
    }

    /// Net PnL from a closed paired-close leg: gross directional PnL minus twice the maker
    /// fee (spec §4.F Closing-order fulfillment, step 2).
    fn realize_pnl(&mut self, info: &ClosingOrder, close_price: Decimal) -> Decimal {
        let gross = match info.side {
            OrderSide::Buy => (close_price - info.open_price) * info.quantity,
            OrderSide::Sell => (info.open_price - close_price) * info.quantity,
        };
        let fees = self.config.maker_fee_rate * info.open_price * info.quantity + self.config.maker_fee_rate * close_price * info.quantity;
        let net = gross - fees;

        self.stats.total_profit += net;
        self.stats.total_fees += fees;
        self.stats.daily_realized_pnl += net;
        self.stats.current_position_value = (self.stats.current_position_value - info.open_price * info.quantity).max(Decimal::ZERO);
        if self.stats.total_profit > self.stats.peak_profit {
            self.stats.peak_profit = self.stats.total_profit;
        }
        let drawdown = self.stats.peak_profit - self.stats.total_profit;
        if drawdown > self.stats.max_drawdown {
            self.stats.max_drawdown = drawdown;
        }
        net
    }

    /// Re-arm the parent rung for a new entry after its paired close has filled: reset
    /// `order_id`, mark idle, start a 2-second cooldown (spec §4.F step 2 "Re-arm the parent
    /// rung").
    fn rearm(&mut self, parent_index: usize, now: DateTime<Utc>) {
        let level = &mut self.levels[parent_index];
        level.order_id = None;
        level.status = GridLevelStatus::Idle;
        level.cooldown_until = Some(now + chrono::Duration::seconds(IDLE_COOLDOWN_SECS));
    }

    /// One monitor pass (spec §4.F Closing-order fulfillment + the implicit "safety backfill"
    /// over idle rungs from the original source's `_check_filled_orders` step 4). The engine
    /// calls this on its own ~2s/~30s cadence; it never sleeps internally.
    #[instrument(skip(self, adapter), fields(symbol = %self.config.symbol))]
    pub async fn monitor_tick(&mut self, adapter: &dyn ExchangeAdapter, current_price: Decimal) -> Result<(), StrategyError> {
        let now = Utc::now();
        if self.check_boundary(adapter, now).await {
            return Err(StrategyError::SelfStopped(format!(
                "{} daily_pnl={} total_profit={}",
                self.config.symbol, self.stats.daily_realized_pnl, self.stats.total_profit
            )));
        }
        if self.is_frozen(now) {
            return Ok(());
        }

        let open_ids: HashSet<VenueOrderId> = adapter
            .get_open_orders(Some(&self.config.symbol))
            .await?
            .into_iter()
            .filter_map(|order| order.venue_id)
            .collect();

        // Step 2: opening rungs whose order has left the open set.
        let pending_indices: Vec<usize> = self
            .levels
            .iter()
            .enumerate()
            .filter(|(_, level)| level.status == GridLevelStatus::Pending && level.order_id.is_some())
            .map(|(index, _)| index)
            .collect();
        for index in pending_indices {
            let order_id = self.levels[index].order_id.clone().expect("filtered above");
            if open_ids.contains(&order_id) {
                continue;
            }
            match adapter.get_order(&order_id, &self.config.symbol).await {
                Ok(order) if matches!(order.status, OrderStatus::Filled | OrderStatus::NotFound) => {
                    self.handle_fill(index, order.price, adapter).await;
                }
                _ => {}
            }
        }

        // Step 3: closing-order registry.
        let closing_ids: Vec<VenueOrderId> = self.closing_orders.keys().cloned().collect();
        for order_id in closing_ids {
            if is_pending_close_id(&order_id) {
                self.retry_unplaced_close(&order_id, adapter).await;
                continue;
            }
            if open_ids.contains(&order_id) {
                continue;
            }
            let Ok(order) = adapter.get_order(&order_id, &self.config.symbol).await else { continue };
            match order.status {
                OrderStatus::Filled | OrderStatus::NotFound => {
                    if let Some(info) = self.closing_orders.remove(&order_id) {
                        let close_price = order.price.unwrap_or(info.open_price);
                        self.realize_pnl(&info, close_price);
                        self.rearm(info.parent_index, now);
                        let _ = self.place_grid_order(info.parent_index, adapter, current_price).await;
                    }
                }
                OrderStatus::Cancelled => {
                    if let Some(info) = self.closing_orders.remove(&order_id) {
                        warn!(marker = "ORDER", %order_id, "closing order cancelled, resubmitting immediately");
                        self.resubmit_closing_order(info, adapter).await;
                    }
                }
                _ => {}
            }
        }

        // Step 4: safety backfill over idle rungs.
        for index in 0..self.levels.len() {
            let level = &self.levels[index];
            if level.status != GridLevelStatus::Idle || level.order_id.is_some() || level.in_cooldown(now) {
                continue;
            }
            self.place_grid_order(index, adapter, current_price).await?;
        }

        Ok(())
    }

    async fn retry_unplaced_close(&mut self, key: &VenueOrderId, adapter: &dyn ExchangeAdapter) {
        if let Some(info) = self.closing_orders.remove(key) {
            self.resubmit_closing_order(info, adapter).await;
        }
    }

    async fn resubmit_closing_order(&mut self, info: ClosingOrder, adapter: &dyn ExchangeAdapter) {
        let close_side = info.side.opposite();
        let close_price = adjacent_rung(&self.levels, info.parent_index, info.side)
            .map(|next| self.levels[next].price)
            .unwrap_or(info.open_level_price);
        let request = OrderRequestOpen::new(self.config.symbol.clone(), close_side, OrderKind::Limit, info.quantity, Some(close_price), true, false, None);
        let key = match adapter.execute_order(request).await {
            Ok(order) => order.venue_id.unwrap_or_else(|| pending_close_id(info.parent_index, Utc::now())),
            Err(_) => pending_close_id(info.parent_index, Utc::now()),
        };
        self.closing_orders.insert(key, info);
    }

    /// Spec §4.F Stop procedure. Cancels every outstanding order, liquidates any residual
    /// position, and leaves the instance in a state where `start` could be called again on a
    /// fresh ladder. Does not touch the market-data socket/HTTP session - that's owned by
    /// whatever embeds this instance.
    pub async fn stop(&mut self, adapter: &dyn ExchangeAdapter) -> Result<(), StrategyError> {
        self.running = false;

        for (order_id, _) in self.closing_orders.drain() {
            if is_pending_close_id(&order_id) {
                continue;
            }
            if let Err(error) = adapter.cancel_order(&self.config.symbol, &order_id).await {
                if !matches!(error, helix_execution::error::ExecutionError::NotFound(_)) {
                    warn!(marker = "ORDER", %error, "failed to cancel closing order during stop");
                }
            }
        }
        for level in &mut self.levels {
            if level.status == GridLevelStatus::Pending {
                if let Some(order_id) = level.order_id.take() {
                    if let Err(error) = adapter.cancel_order(&self.config.symbol, &order_id).await {
                        if !matches!(error, helix_execution::error::ExecutionError::NotFound(_)) {
                            warn!(marker = "ORDER", %error, "failed to cancel pending rung during stop");
                        }
                    }
                }
                level.status = GridLevelStatus::Cancelled;
            }
        }

        if adapter.supports_native_positions() {
            if let Ok(positions) = adapter.get_positions(Some(&self.config.symbol)).await {
                for position in positions {
                    if position.quantity.is_zero() {
                        continue;
                    }
                    let request = OrderRequestOpen::new(
                        self.config.symbol.clone(),
                        position.side.closing_order_side(),
                        OrderKind::Market,
                        position.quantity,
                        None,
                        true,
                        false,
                        None,
                    );
                    if let Err(error) = adapter.execute_order(request).await {
                        warn!(marker = "ORDER", %error, "failed to liquidate residual position during stop");
                    }
                }
            }
        } else {
            // Avoid a graph-endpoint call during teardown; close only the trades this adapter
            // itself opened, using the (pair_id, trade_index) tuples it cached at placement.
            let mut seen = HashSet::new();
            for (venue_id, pair_ref) in adapter.cached_close_refs() {
                if !seen.insert(pair_ref) {
                    continue;
                }
                if let Err(error) = adapter.close_cached_ref(&venue_id).await {
                    if !matches!(error, helix_execution::error::ExecutionError::NotFound(_)) {
                        warn!(marker = "ORDER", %error, "failed to close cached trade during stop");
                    }
                }
            }
        }

        info!(symbol = %self.config.symbol, "grid instance stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_execution::{
        adapter::{Depth, Kline, MarketInfo, Ticker},
        balance::AssetBalance,
        error::ExecutionError,
        order::{Order, VenueOrderId},
        position::Position,
    };
    use helix_instrument::asset::Asset;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    #[derive(Default)]
    struct StubAdapter {
        open_orders: Mutex<Vec<Order>>,
        next_order_seq: Mutex<u64>,
    }

    #[async_trait::async_trait]
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
            let mut seq = self.next_order_seq.lock();
            *seq += 1;
            let venue_id = VenueOrderId::new(format!("v{seq}"));
            let order = Order::new_open(
                helix_execution::order::OrderId::new(*seq, 0),
                venue_id,
                request,
                Utc::now(),
            );
            self.open_orders.lock().push(order.clone());
            Ok(order)
        }
        async fn get_open_orders(&self, _symbol: Option<&Symbol>) -> Result<Vec<Order>, ExecutionError> {
            Ok(self.open_orders.lock().clone())
        }
        async fn get_order(&self, id: &VenueOrderId, _symbol: &Symbol) -> Result<Order, ExecutionError> {
            self.open_orders
                .lock()
                .iter()
                .find(|order| order.venue_id.as_ref() == Some(id))
                .cloned()
                .ok_or_else(|| ExecutionError::NotFound(id.0.clone()))
        }
        async fn cancel_order(&self, _symbol: &Symbol, id: &VenueOrderId) -> Result<(), ExecutionError> {
            self.open_orders.lock().retain(|order| order.venue_id.as_ref() != Some(id));
            Ok(())
        }
        async fn cancel_all_orders(&self, _symbol: Option<&Symbol>) -> Result<(), ExecutionError> {
            self.open_orders.lock().clear();
            Ok(())
        }
    }

    fn config() -> GridInstanceConfig {
        GridInstanceConfig::with_defaults(Symbol::new("ETH_USDC_PERP"), GridMode::LongShort, dec!(1900), dec!(2100), 10, dec!(100), dec!(5))
    }

    #[tokio::test]
    async fn initial_placement_only_places_non_crossing_rungs() {
        let adapter = StubAdapter::default();
        let mut instance = GridInstance::new(config(), dec!(2000));
        instance.place_initial_orders(&adapter, dec!(2000)).await.unwrap();

        let placed = adapter.open_orders.lock().len();
        // rungs strictly below 2000 (buys) and strictly above (sells) should place; the rung
        // at exactly 2000 crosses for both sides and is skipped.
        assert_eq!(placed, 10);
    }

    #[tokio::test]
    async fn fill_registers_a_paired_reduce_only_close() {
        let adapter = StubAdapter::default();
        let mut instance = GridInstance::new(config(), dec!(2000));
        instance.place_initial_orders(&adapter, dec!(2000)).await.unwrap();

        instance.handle_fill(4, Some(dec!(1980)), &adapter).await;

        assert_eq!(instance.levels[4].status, GridLevelStatus::Closing);
        assert_eq!(instance.stats.total_trades, 1);
        assert_eq!(instance.stats.buy_count, 1);
        assert_eq!(instance.closing_orders.len(), 1);
        let closing = instance.closing_orders.values().next().unwrap();
        assert_eq!(closing.side, OrderSide::Buy);
    }

    #[tokio::test]
    async fn realized_pnl_nets_out_two_maker_fees() {
        let mut instance = GridInstance::new(config(), dec!(2000));
        let info = ClosingOrder { parent_index: 0, open_level_price: dec!(1980), side: OrderSide::Buy, quantity: dec!(1), open_price: dec!(1980) };
        let net = instance.realize_pnl(&info, dec!(2000));
        // gross = (2000-1980)*1 = 20; fees = 0.0004*1980 + 0.0004*2000 = 1.592
        assert_eq!(net, dec!(20) - (dec!(0.0004) * dec!(1980) + dec!(0.0004) * dec!(2000)));
        assert_eq!(instance.stats.total_profit, net);
    }

    #[tokio::test]
    async fn daily_loss_breach_stops_the_instance() {
        let adapter = StubAdapter::default();
        let mut instance = GridInstance::new(config(), dec!(2000));
        instance.stats.daily_realized_pnl = -instance.config.daily_loss_limit() - dec!(1);
        let stopped = instance.check_boundary(&adapter, Utc::now()).await;
        assert!(stopped);
        assert!(!instance.running);
    }
}
