//! The order/position/balance state owner and its five background loops (spec §4.D, §4.E).
//!
//! Out of scope: an inbound webhook relay (spec §6.2) that a separate UI-facing process would
//! expose on a local port - `POST /register_instance` (instance_id, exchange, private_key,
//! strategy_name, symbol, leverage, margin_amount, stop_loss_ratio, take_profit_ratio,
//! forbidden_hours), `POST /unregister_instance/{id}`, `GET /instances`, `GET /balance/{id}`.
//! This engine only honours signals that already arrive through the adapter's order submission
//! path; a compliant deployment may implement that surface as a thin shim in front of
//! [`LiveTradingEngine::place_order`] or omit it entirely.

use crate::{config::EngineConfig, error::EngineError};
use chrono::{DateTime, Utc};
use helix_data::kline::KlineUpdate;
use helix_execution::{
    adapter::{ExchangeAdapter, Kline as ExecKline},
    error::ExecutionError,
    order::{Order, OrderId, OrderIdGenerator, OrderKind, OrderRequestOpen, OrderSide, OrderStatus, VenueOrderId},
    position::{Position, PositionSide},
    precision::{PrecisionCache, PrecisionRule},
    signal::{Signal, SignalAction},
};
use helix_instrument::{asset::Asset, symbol::Symbol};
use helix_risk::manager::{OrderSide as RiskOrderSide, RiskManager};
use helix_snapshot::{
    fire_and_forget,
    record::{PortfolioSnapshot, TradeRecord},
    sink::PersistenceSink,
};
use helix_strategy::{KlineSeries, Strategy};
use helix_ta::indicators::SimpleMovingAverage;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, error, info, warn};

const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(2);
const POSITION_MONITOR_INTERVAL: Duration = Duration::from_secs(30);
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(60);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);
const STOP_JOIN_GRACE: Duration = Duration::from_secs(2);
const RECONCILE_RETRY_DELAY: Duration = Duration::from_secs(5);
const DISPATCH_SMA_PERIOD: usize = 20;

/// The three maps the engine owns for the lifetime of a trading session, plus the bookkeeping
/// the submission and monitor loops share. Never held across an `.await` point.
struct EngineState {
    orders: Mutex<HashMap<OrderId, Order>>,
    positions: Mutex<HashMap<Symbol, Position>>,
    balances: Mutex<HashMap<Asset, Decimal>>,
    risk: Mutex<RiskManager>,
    id_gen: Mutex<OrderIdGenerator>,
    precision: PrecisionCache,
    /// First unrecoverable adapter error any loop has observed, latched here so `stop()` can
    /// re-raise it once every task has been joined (spec §7: "Fatal is re-raised after stop()").
    fatal: Mutex<Option<String>>,
}

/// Owns a single exchange adapter end to end: order/position/balance state, the submission
/// path, and the five background loops (status poll, position monitor, snapshot, heartbeat,
/// kline dispatch) that drive it (spec §4.D/§4.E).
pub struct LiveTradingEngine {
    adapter: Arc<dyn ExchangeAdapter>,
    sink: Arc<dyn PersistenceSink>,
    config: EngineConfig,
    state: Arc<EngineState>,
    stop: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl LiveTradingEngine {
    pub fn new(adapter: Arc<dyn ExchangeAdapter>, sink: Arc<dyn PersistenceSink>, config: EngineConfig) -> Self {
        let state = Arc::new(EngineState {
            orders: Mutex::new(HashMap::new()),
            positions: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
            risk: Mutex::new(RiskManager::new(config.risk)),
            id_gen: Mutex::new(OrderIdGenerator::default()),
            precision: PrecisionCache::new(),
            fatal: Mutex::new(None),
        });

        Self {
            adapter,
            sink,
            config,
            state,
            stop: Arc::new(AtomicBool::new(false)),
            tasks: Vec::new(),
        }
    }

    /// Fetches up to `preload_klines_limit` rows per configured symbol so the kline dispatcher
    /// starts with a populated cache rather than waiting for `min_preload_rows` live bars to
    /// accumulate one at a time (spec §4.D Data preload).
    pub async fn preload(&self) -> HashMap<Symbol, KlineSeries> {
        let mut market_data = HashMap::new();

        for symbol in &self.config.symbols {
            match self
                .adapter
                .get_klines(symbol, &self.config.kline_interval, None, None, self.config.preload_klines_limit)
                .await
            {
                Ok(klines) => {
                    if klines.len() < self.config.min_preload_rows {
                        warn!(
                            %symbol,
                            rows = klines.len(),
                            minimum = self.config.min_preload_rows,
                            "preload returned fewer rows than the minimum required before dispatch"
                        );
                    }
                    market_data.insert(symbol.clone(), klines);
                }
                Err(error) => {
                    warn!(%error, %symbol, "kline preload failed, starting with an empty series");
                    market_data.insert(symbol.clone(), Vec::new());
                }
            }
        }

        market_data
    }

    /// Preloads market data and spawns the five background loops. `klines_rx` is the market-data
    /// fan-in's output channel (spec §4.B); this engine only consumes it.
    pub async fn start(&mut self, strategy: Box<dyn Strategy>, klines_rx: mpsc::UnboundedReceiver<KlineUpdate>) {
        self.stop.store(false, Ordering::Relaxed);
        let market_data = self.preload().await;

        self.tasks.push(tokio::spawn(status_poll_loop(
            self.adapter.clone(),
            self.sink.clone(),
            self.state.clone(),
            self.stop.clone(),
        )));
        self.tasks.push(tokio::spawn(position_monitor_loop(
            self.adapter.clone(),
            self.sink.clone(),
            self.state.clone(),
            self.config.clone(),
            self.stop.clone(),
        )));
        self.tasks.push(tokio::spawn(snapshot_loop(
            self.adapter.clone(),
            self.sink.clone(),
            self.state.clone(),
            self.stop.clone(),
        )));
        self.tasks.push(tokio::spawn(heartbeat_loop(self.state.clone(), self.stop.clone())));
        self.tasks.push(tokio::spawn(kline_dispatch_loop(
            strategy,
            market_data,
            klines_rx,
            self.adapter.clone(),
            self.sink.clone(),
            self.state.clone(),
            self.config.clone(),
            self.stop.clone(),
        )));

        info!(symbols = self.config.symbols.len(), marker = "ORDER", "live trading engine started");
    }

    /// Signals every background loop to exit, then joins each with a 2-second grace period
    /// before aborting whatever hasn't finished (spec §5 stop sequencing).
    pub async fn stop(&mut self) -> Result<(), EngineError> {
        self.stop.store(true, Ordering::Relaxed);

        for task in self.tasks.drain(..) {
            let abort_handle = task.abort_handle();
            if tokio::time::timeout(STOP_JOIN_GRACE, task).await.is_err() {
                warn!("background task exceeded its cancellation grace period, aborting");
                abort_handle.abort();
            }
        }

        info!(marker = "ORDER", "live trading engine stopped");

        if let Some(message) = self.state.fatal.lock().take() {
            return Err(EngineError::Fatal(message));
        }
        Ok(())
    }

    /// The place_order submission path (spec §4.D): symbol translation, precision rounding, a
    /// capital-gated pre-trade risk check, adapter submission, then persistence.
    pub async fn place_order(&self, request: OrderRequestOpen, current_price: Decimal, account_capital: Option<Decimal>) -> Result<Order, EngineError> {
        submit_order(request, &self.adapter, &self.sink, &self.state, Some((current_price, account_capital))).await
    }

    pub fn open_positions(&self) -> HashMap<Symbol, Position> {
        self.state.positions.lock().clone()
    }

    pub fn open_orders(&self) -> HashMap<OrderId, Order> {
        self.state.orders.lock().clone()
    }
}

/// Classifies an adapter error the way every loop boundary in this crate does, latching a
/// [`EngineError::Fatal`] into `state.fatal` so `stop()` can re-raise it once every background
/// task has been joined (spec §7).
fn classify_adapter_error(error: ExecutionError, state: &EngineState) -> EngineError {
    let classified = EngineError::from_adapter(error);
    if let EngineError::Fatal(ref message) = classified {
        let mut fatal = state.fatal.lock();
        if fatal.is_none() {
            *fatal = Some(message.clone());
        }
    }
    classified
}

/// Looks up the cached precision rule for `symbol`, fetching and caching it from
/// `get_markets` on a miss (spec §4.A: "queried once per symbol and cached for one hour").
async fn precision_rule(symbol: &Symbol, adapter: &Arc<dyn ExchangeAdapter>, state: &Arc<EngineState>) -> Result<PrecisionRule, EngineError> {
    if let Some(rule) = state.precision.get(symbol) {
        return Ok(rule);
    }

    let markets = adapter.get_markets().await.map_err(|error| classify_adapter_error(error, state))?;
    let info = markets
        .into_iter()
        .find(|(market_symbol, _)| market_symbol == symbol)
        .map(|(_, info)| info)
        .ok_or_else(|| EngineError::Adapter(ExecutionError::UnknownSymbol(symbol.to_string())))?;

    let rule = PrecisionRule {
        lot_size: info.lot_size,
        tick_size: info.price_tick,
        min_notional: info.min_notional,
    };
    state.precision.put(symbol.clone(), rule);
    Ok(rule)
}

/// Returns `supplied` if present, otherwise queries and caches the account's total balance
/// across every asset. Never guesses a fallback figure - a failed lookup propagates as `None`
/// so the caller can treat capital as "unknown" rather than zero.
async fn resolve_account_capital(adapter: &Arc<dyn ExchangeAdapter>, state: &Arc<EngineState>, supplied: Option<Decimal>) -> Option<Decimal> {
    if supplied.is_some() {
        return supplied;
    }

    match adapter.get_balance().await {
        Ok(balances) => {
            let mut cache = state.balances.lock();
            cache.clear();
            for entry in &balances {
                cache.insert(entry.asset.clone(), entry.balance.total);
            }
            Some(balances.iter().map(|entry| entry.balance.total).sum())
        }
        Err(error) => {
            debug!(%error, "account capital lookup failed");
            None
        }
    }
}

/// Shared submission path for both strategy-originated orders (risk-checked) and reduce-only
/// forced closes (`risk_check: None`, since a close can only shrink exposure).
async fn submit_order(
    mut request: OrderRequestOpen,
    adapter: &Arc<dyn ExchangeAdapter>,
    sink: &Arc<dyn PersistenceSink>,
    state: &Arc<EngineState>,
    risk_check: Option<(Decimal, Option<Decimal>)>,
) -> Result<Order, EngineError> {
    let now = Utc::now();
    let provisional_id = state.id_gen.lock().next(now);

    request.symbol = adapter.canonicalise(&request.symbol);
    let rule = precision_rule(&request.symbol, adapter, state).await?;
    request.quantity = rule.round_quantity(request.quantity);
    request.price = request.price.map(|price| rule.round_price(price));

    if let Some((current_price, supplied_capital)) = risk_check {
        let account_capital = resolve_account_capital(adapter, state, supplied_capital).await;
        let risk_side = match request.side {
            OrderSide::Buy => RiskOrderSide::Buy,
            OrderSide::Sell => RiskOrderSide::Sell,
        };
        let check = state.risk.lock().check_order_risk(
            &request.symbol,
            risk_side,
            request.quantity,
            request.price.unwrap_or(current_price),
            Some(current_price),
            account_capital,
        );
        if !check.approved {
            warn!(symbol = %request.symbol, violations = ?check.violations, marker = "RISK", "order vetoed by risk manager");
            return Err(EngineError::RiskViolation(check.violations.join("; ")));
        }
    }

    let order = adapter.execute_order(request).await.map_err(|error| classify_adapter_error(error, state))?;

    state.orders.lock().insert(order.id, order.clone());
    fire_and_forget!(sink.save_order(&order), "save_order");
    info!(
        order_id = %order.id,
        provisional_id = %provisional_id,
        symbol = %order.symbol,
        side = %order.side,
        qty = %order.quantity,
        marker = "ORDER",
        "order submitted"
    );
    Ok(order)
}

/// Polls every non-terminal order once per tick, applies the 404 triple-strike imputed-fill
/// rule, and routes anything that became `Filled` into [`handle_fill`] (spec §4.D Status poll).
async fn status_poll_loop(adapter: Arc<dyn ExchangeAdapter>, sink: Arc<dyn PersistenceSink>, state: Arc<EngineState>, stop: Arc<AtomicBool>) {
    let mut ticker = tokio::time::interval(STATUS_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !stop.load(Ordering::Relaxed) {
        ticker.tick().await;
        if stop.load(Ordering::Relaxed) {
            break;
        }

        let pending: Vec<Order> = state.orders.lock().values().filter(|order| !order.is_terminal()).cloned().collect();

        for mut order in pending {
            let Some(venue_id) = order.venue_id.clone() else { continue };

            match adapter.get_order(&venue_id, &order.symbol).await {
                Ok(mut fresh) => {
                    fresh.reset_not_found_strikes();
                    let became_filled = fresh.status == OrderStatus::Filled;
                    state.orders.lock().insert(fresh.id, fresh.clone());
                    fire_and_forget!(sink.save_order(&fresh), "save_order");
                    if became_filled {
                        handle_fill(fresh, &adapter, &sink, &state).await;
                    }
                }
                Err(ExecutionError::NotFound(_)) => {
                    let imputed = order.strike_not_found();
                    state.orders.lock().insert(order.id, order.clone());
                    if imputed {
                        warn!(order_id = %order.id, venue_id = %venue_id, marker = "ORDER", "order not found 3x in a row, imputing fill");
                        order.status = OrderStatus::Filled;
                        order.filled_quantity = order.quantity;
                        handle_fill(order, &adapter, &sink, &state).await;
                    }
                }
                Err(error) => {
                    warn!(%error, order_id = %order.id, "status poll failed");
                }
            }
        }
    }
}

/// Applies a fill to the local position ledger. Returns the realized PnL when the fill reduced
/// an existing opposite-direction position, `None` when it opened or added to one.
fn apply_fill_to_position(positions: &mut HashMap<Symbol, Position>, order: &Order, price: Decimal, now: DateTime<Utc>) -> Option<Decimal> {
    match positions.get(&order.symbol).cloned() {
        None => {
            let side = match order.side {
                OrderSide::Buy => PositionSide::Long,
                OrderSide::Sell => PositionSide::Short,
            };
            positions.insert(order.symbol.clone(), Position::new(order.symbol.clone(), side, order.quantity, price, now));
            None
        }
        Some(mut existing) => {
            let same_direction = matches!((existing.side, order.side), (PositionSide::Long, OrderSide::Buy) | (PositionSide::Short, OrderSide::Sell));

            if same_direction {
                let total_qty = existing.quantity + order.quantity;
                existing.entry_price = (existing.entry_price * existing.quantity + price * order.quantity) / total_qty;
                existing.quantity = total_qty;
                existing.updated_at = now;
                positions.insert(order.symbol.clone(), existing);
                None
            } else {
                let closing_qty = order.quantity.min(existing.quantity);
                let pnl = match existing.side {
                    PositionSide::Long => (price - existing.entry_price) * closing_qty,
                    PositionSide::Short => (existing.entry_price - price) * closing_qty,
                };
                existing.realized_pnl += pnl;
                existing.quantity -= closing_qty;
                existing.updated_at = now;

                if existing.quantity.is_zero() {
                    positions.remove(&order.symbol);
                } else {
                    positions.insert(order.symbol.clone(), existing);
                }
                Some(pnl)
            }
        }
    }
}

/// Fill-price fallback chain (spec §4.D, §9 Open Question, preserved as-is): the order's own
/// limit price, else the current ticker, else the existing position's entry price, else zero.
// TODO: replace the final fallback with a persisted average-execution price once a venue
// exposes one; guessing a number here would be worse than the documented zero.
async fn fill_price(order: &Order, adapter: &Arc<dyn ExchangeAdapter>, state: &Arc<EngineState>) -> Decimal {
    if let Some(price) = order.price {
        return price;
    }
    if let Ok(ticker) = adapter.get_ticker(&order.symbol).await {
        return ticker.last_price;
    }
    if let Some(position) = state.positions.lock().get(&order.symbol) {
        return position.entry_price;
    }
    Decimal::ZERO
}

/// Fill handling (spec §4.D): resolves a fill price, updates the position ledger and the risk
/// manager's mirror, persists a [`TradeRecord`], and removes the order from the working set
/// regardless of whether persistence succeeded.
async fn handle_fill(mut order: Order, adapter: &Arc<dyn ExchangeAdapter>, sink: &Arc<dyn PersistenceSink>, state: &Arc<EngineState>) {
    let now = Utc::now();
    order.filled_at.get_or_insert(now);

    let price = fill_price(&order, adapter, state).await;

    let pnl = {
        let mut positions = state.positions.lock();
        apply_fill_to_position(&mut positions, &order, price, now)
    };

    {
        let risk_side = match order.side {
            OrderSide::Buy => RiskOrderSide::Buy,
            OrderSide::Sell => RiskOrderSide::Sell,
        };
        let mut risk = state.risk.lock();
        risk.update_position(order.symbol.clone(), risk_side, order.quantity, price);
        if let Some(pnl) = pnl {
            risk.close_position(&order.symbol, price, pnl);
        }
    }

    let trade = TradeRecord::new(
        format!("{}-fill", order.id),
        order.id,
        order.venue_id.clone(),
        order.symbol.clone(),
        order.side,
        order.quantity,
        price,
        order.commission,
        "USDC".to_string(),
        false,
        now,
    );
    fire_and_forget!(sink.save_trade(&trade), "save_trade");

    info!(symbol = %order.symbol, side = %order.side, qty = %order.quantity, price = %price, marker = "TRADE", "order filled");

    state.orders.lock().remove(&order.id);
}

/// Replaces the local copy of `symbol`'s position with whatever the venue reports; venue state
/// is always authoritative (spec §4.D Position monitor, venue-authoritative reconciliation).
async fn reconcile_against_venue(symbol: &Symbol, adapter: &Arc<dyn ExchangeAdapter>, state: &Arc<EngineState>) {
    match adapter.get_positions(Some(symbol)).await {
        Ok(venue_positions) => {
            let mut positions = state.positions.lock();
            match venue_positions.into_iter().next() {
                Some(venue_position) => {
                    positions.insert(symbol.clone(), venue_position);
                }
                None => {
                    positions.remove(symbol);
                }
            }
        }
        Err(error) => {
            debug!(%error, %symbol, "position reconciliation query failed, keeping local state");
        }
    }
}

/// Spawns a detached retry of [`reconcile_against_venue`] after the delay, used when a forced
/// close fails and the local ledger might now disagree with the venue (spec §4.D "5s delayed
/// re-sync on close failure").
fn schedule_delayed_resync(symbol: Symbol, adapter: Arc<dyn ExchangeAdapter>, state: Arc<EngineState>) {
    tokio::spawn(async move {
        tokio::time::sleep(RECONCILE_RETRY_DELAY).await;
        reconcile_against_venue(&symbol, &adapter, &state).await;
    });
}

/// Leveraged PnL, stop-loss/take-profit reduce-only close, and venue reconciliation, once per
/// tick per open position (spec §4.D Position monitor loop). `pnl_pct` is already leveraged
/// ([`Position::leveraged_pnl_pct`]) and is compared directly against the unleveraged
/// `stop_loss_percent`/`take_profit_percent` config values, matching the original
/// `pnl_percent <= -STOP_LOSS_PERCENT` / `>= TAKE_PROFIT_PERCENT` check with no re-multiplication
/// by leverage.
async fn position_monitor_loop(adapter: Arc<dyn ExchangeAdapter>, sink: Arc<dyn PersistenceSink>, state: Arc<EngineState>, config: EngineConfig, stop: Arc<AtomicBool>) {
    let mut ticker = tokio::time::interval(POSITION_MONITOR_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !stop.load(Ordering::Relaxed) {
        ticker.tick().await;
        if stop.load(Ordering::Relaxed) {
            break;
        }

        let snapshot: Vec<Position> = state.positions.lock().values().cloned().collect();

        for position in snapshot {
            let mark_price = match adapter.get_ticker(&position.symbol).await {
                Ok(ticker) => ticker.last_price,
                Err(error) => {
                    warn!(%error, symbol = %position.symbol, "position monitor: ticker unavailable, using entry price");
                    position.entry_price
                }
            };

            {
                let mut positions = state.positions.lock();
                if let Some(tracked) = positions.get_mut(&position.symbol) {
                    tracked.update_mark(mark_price, config.risk.leverage);
                }
            }

            let pnl_pct = position.leveraged_pnl_pct(mark_price, config.risk.leverage);
            let should_force_close = config.risk.enable_stop_loss
                && (pnl_pct <= -config.risk.stop_loss_percent || pnl_pct >= config.risk.take_profit_percent);

            if should_force_close {
                warn!(symbol = %position.symbol, pnl_pct = %pnl_pct, marker = "RISK", "position monitor forcing reduce-only close");

                let close_request = OrderRequestOpen::new(
                    position.symbol.clone(),
                    position.side.closing_order_side(),
                    OrderKind::Market,
                    position.quantity,
                    None,
                    true,
                    false,
                    None,
                );

                if let Err(error) = submit_order(close_request, &adapter, &sink, &state, None).await {
                    error!(%error, symbol = %position.symbol, "forced close failed, scheduling delayed re-sync");
                    schedule_delayed_resync(position.symbol.clone(), adapter.clone(), state.clone());
                }
            }

            reconcile_against_venue(&position.symbol, &adapter, &state).await;
        }
    }
}

/// Persists a portfolio snapshot once per tick and refreshes the cached balance map alongside
/// it (spec §4.D Snapshot loop).
async fn snapshot_loop(adapter: Arc<dyn ExchangeAdapter>, sink: Arc<dyn PersistenceSink>, state: Arc<EngineState>, stop: Arc<AtomicBool>) {
    let mut ticker = tokio::time::interval(SNAPSHOT_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !stop.load(Ordering::Relaxed) {
        ticker.tick().await;
        if stop.load(Ordering::Relaxed) {
            break;
        }

        resolve_account_capital(&adapter, &state, None).await;
        let cash: Decimal = state.balances.lock().values().copied().sum();

        let (position_value, daily_pnl) = {
            let risk = state.risk.lock();
            (risk.portfolio_value(), risk.daily_pnl())
        };
        let total_value = cash + position_value;
        let daily_return_pct = if total_value.is_zero() { Decimal::ZERO } else { daily_pnl / total_value };

        let snapshot = PortfolioSnapshot::new(Utc::now(), cash, position_value, total_value, daily_pnl, daily_return_pct);
        fire_and_forget!(sink.save_portfolio_snapshot(&snapshot), "save_portfolio_snapshot");
    }
}

/// Logs a heartbeat only while the engine carries open positions (spec §4.D Heartbeat,
/// "conditional on open positions") - an idle engine with a flat book stays silent.
async fn heartbeat_loop(state: Arc<EngineState>, stop: Arc<AtomicBool>) {
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !stop.load(Ordering::Relaxed) {
        ticker.tick().await;
        if stop.load(Ordering::Relaxed) {
            break;
        }

        let position_count = state.positions.lock().len();
        if position_count > 0 {
            info!(position_count, marker = "RISK", "heartbeat: engine alive with open positions");
        }
    }
}

/// Whether opening one more unit of `symbol` at `price` would push projected margin usage past
/// `margin_cap_pct` of account capital (spec §4.D Per-symbol kline dispatch, "10%-of-capital
/// margin cap check"). Unknown capital is treated as "don't block" - the risk manager's own
/// pre-trade check is the authoritative gate and already rejects on unknown capital.
async fn margin_within_cap(symbol: &Symbol, price: Decimal, adapter: &Arc<dyn ExchangeAdapter>, state: &Arc<EngineState>, config: &EngineConfig) -> bool {
    let Some(capital) = resolve_account_capital(adapter, state, None).await.filter(|capital| *capital > Decimal::ZERO) else {
        return true;
    };

    let existing_margin = state.risk.lock().portfolio_value() / config.risk.leverage;
    let projected_margin = existing_margin + price / config.risk.leverage;
    let within_cap = projected_margin <= capital * config.margin_cap_pct;

    debug!(%symbol, %projected_margin, %capital, within_cap, "margin cap check");
    within_cap
}

/// Per-symbol kline dispatch (spec §4.D): appends each newly-closed bar to the symbol's cache,
/// skips dispatch while an order is already working or margin is capped out, maintains a
/// confirmation SMA, and translates any actionable signal into a forced-market order.
#[allow(clippy::too_many_arguments)]
async fn kline_dispatch_loop(
    mut strategy: Box<dyn Strategy>,
    mut market_data: HashMap<Symbol, KlineSeries>,
    mut klines_rx: mpsc::UnboundedReceiver<KlineUpdate>,
    adapter: Arc<dyn ExchangeAdapter>,
    sink: Arc<dyn PersistenceSink>,
    state: Arc<EngineState>,
    config: EngineConfig,
    stop: Arc<AtomicBool>,
) {
    let mut indicators: HashMap<Symbol, SimpleMovingAverage> = HashMap::new();

    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }

        let Some(update) = klines_rx.recv().await else {
            break;
        };
        if !update.kline.is_closed {
            continue;
        }

        let symbol = update.symbol.clone();
        let series = market_data.entry(symbol.clone()).or_default();
        series.push(ExecKline {
            open_time_ms: update.kline.open_time_ms,
            open: update.kline.open,
            high: update.kline.high,
            low: update.kline.low,
            close: update.kline.close,
            volume: update.kline.volume,
        });
        if series.len() as u32 > config.preload_klines_limit {
            series.remove(0);
        }
        if series.len() < config.min_preload_rows {
            continue;
        }

        let sma = indicators.entry(symbol.clone()).or_insert_with(|| SimpleMovingAverage::new(DISPATCH_SMA_PERIOD));
        let sma_value = sma.update(update.kline.close);
        debug!(%symbol, sma = %sma_value, "dispatch indicator updated");

        let has_open_order = state.orders.lock().values().any(|order| order.symbol == symbol && !order.is_terminal());
        if has_open_order {
            continue;
        }

        if !margin_within_cap(&symbol, update.kline.close, &adapter, &state, &config).await {
            warn!(%symbol, marker = "RISK", "skipping dispatch: projected margin would exceed the capital cap");
            continue;
        }

        let signals = match strategy.calculate_signal(&market_data).await {
            Ok(signals) => signals,
            Err(error) => {
                warn!(%error, %symbol, "strategy signal computation failed");
                continue;
            }
        };

        for signal in signals.into_iter().filter(|signal| signal.is_actionable() && signal.symbol == symbol) {
            info!(%symbol, action = ?signal.action, confidence = %signal.confidence, marker = "SIGNAL", "signal received");

            let side = match signal.action {
                SignalAction::Buy => OrderSide::Buy,
                SignalAction::Sell => OrderSide::Sell,
                SignalAction::Hold => continue,
            };

            let quantity = signal.quantity;
            let request = order_request_from_signal(symbol.clone(), side, signal);

            match submit_order(request, &adapter, &sink, &state, Some((update.kline.close, None))).await {
                Ok(order) => debug!(order_id = %order.id, qty = %quantity, "signal-derived order submitted"),
                Err(error) => warn!(%error, %symbol, "signal-derived order failed"),
            }
        }
    }
}

/// Forces every strategy-originated signal through a market order (spec §4.D "signal→order
/// translation forcing MARKET orders"); only the grid engine places resting limit orders.
fn order_request_from_signal(symbol: Symbol, side: OrderSide, signal: Signal) -> OrderRequestOpen {
    let quantity = signal.quantity;
    OrderRequestOpen::new(symbol, side, OrderKind::Market, quantity, None, false, false, Some(signal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_execution::{adapter::{Depth, MarketInfo, Ticker}, balance::{AssetBalance, Balance}};
    use helix_risk::config::TradingConfig;
    use helix_snapshot::record::{PortfolioSnapshot as PortfolioSnapshotRecord, TradeRecord as TradeRecordSnapshot};
    use helix_risk::event::RiskEvent;
    use rust_decimal_macros::dec;
    use std::collections::HashMap as StdHashMap;
    use async_trait::async_trait;

    #[derive(Default)]
    struct StubAdapter {
        orders: Mutex<Vec<Order>>,
        next_seq: Mutex<u64>,
        balance_total: Mutex<Decimal>,
        positions: Mutex<Vec<Position>>,
        fail_markets_unrecoverable: Mutex<bool>,
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
            if *self.fail_markets_unrecoverable.lock() {
                return Err(ExecutionError::UnknownSymbol("forced".into()));
            }
            Ok(vec![(
                Symbol::new("ETH_USDC_PERP"),
                MarketInfo {
                    base: Asset::new_from_exchange("ETH"),
                    quote: Asset::new_from_exchange("USDC"),
                    price_tick: dec!(0.01),
                    lot_size: dec!(0.001),
                    min_notional: dec!(5),
                    price_precision: 2,
                    quantity_precision: 3,
                },
            )])
        }
        async fn get_ticker(&self, symbol: &Symbol) -> Result<Ticker, ExecutionError> {
            Ok(Ticker {
                symbol: symbol.clone(),
                last_price: dec!(2000),
                high_price: dec!(2010),
                low_price: dec!(1990),
                volume: dec!(1000),
                time_exchange: Utc::now(),
            })
        }
        async fn get_depth(&self, _symbol: &Symbol, _limit: u32) -> Result<Depth, ExecutionError> {
            Ok(Depth { bids: Vec::new(), asks: Vec::new() })
        }
        async fn get_klines(&self, _symbol: &Symbol, _interval: &str, _start_ms: Option<i64>, _end_ms: Option<i64>, _limit: u32) -> Result<Vec<ExecKline>, ExecutionError> {
            Ok(Vec::new())
        }
        async fn get_server_time(&self) -> Result<i64, ExecutionError> {
            Ok(0)
        }
        async fn get_balance(&self) -> Result<Vec<AssetBalance<Asset>>, ExecutionError> {
            let total = *self.balance_total.lock();
            Ok(vec![AssetBalance::new(Asset::new_from_exchange("USDC"), Balance::new(total, total), Utc::now())])
        }
        async fn get_positions(&self, symbol: Option<&Symbol>) -> Result<Vec<Position>, ExecutionError> {
            let positions = self.positions.lock();
            Ok(match symbol {
                Some(symbol) => positions.iter().filter(|position| &position.symbol == symbol).cloned().collect(),
                None => positions.clone(),
            })
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
            Ok(self.orders.lock().iter().filter(|order| !order.is_terminal()).cloned().collect())
        }
        async fn get_order(&self, id: &VenueOrderId, _symbol: &Symbol) -> Result<Order, ExecutionError> {
            self.orders.lock().iter().find(|order| order.venue_id.as_ref() == Some(id)).cloned().ok_or_else(|| ExecutionError::NotFound(id.0.clone()))
        }
        async fn cancel_order(&self, _symbol: &Symbol, id: &VenueOrderId) -> Result<(), ExecutionError> {
            self.orders.lock().retain(|order| order.venue_id.as_ref() != Some(id));
            Ok(())
        }
        async fn cancel_all_orders(&self, _symbol: Option<&Symbol>) -> Result<(), ExecutionError> {
            self.orders.lock().clear();
            Ok(())
        }
    }

    #[derive(Default)]
    struct StubSink {
        orders: Mutex<Vec<Order>>,
        trades: Mutex<Vec<TradeRecordSnapshot>>,
        snapshots: Mutex<Vec<PortfolioSnapshotRecord>>,
    }

    #[async_trait]
    impl PersistenceSink for StubSink {
        async fn save_order(&self, order: &Order) -> Result<(), helix_snapshot::sink::SnapshotError> {
            self.orders.lock().push(order.clone());
            Ok(())
        }
        async fn save_trade(&self, trade: &TradeRecordSnapshot) -> Result<(), helix_snapshot::sink::SnapshotError> {
            self.trades.lock().push(trade.clone());
            Ok(())
        }
        async fn save_position(&self, _position: &Position) -> Result<(), helix_snapshot::sink::SnapshotError> {
            Ok(())
        }
        async fn save_portfolio_snapshot(&self, snapshot: &PortfolioSnapshotRecord) -> Result<(), helix_snapshot::sink::SnapshotError> {
            self.snapshots.lock().push(*snapshot);
            Ok(())
        }
        async fn save_risk_event(&self, _event: &RiskEvent) -> Result<(), helix_snapshot::sink::SnapshotError> {
            Ok(())
        }
        async fn load_open_orders(&self) -> Result<Vec<Order>, helix_snapshot::sink::SnapshotError> {
            Ok(Vec::new())
        }
        async fn load_positions(&self) -> Result<Vec<Position>, helix_snapshot::sink::SnapshotError> {
            Ok(Vec::new())
        }
    }

    fn config() -> EngineConfig {
        let mut config = EngineConfig::new(vec![Symbol::new("ETH_USDC_PERP")], "15m");
        config.risk = TradingConfig { leverage: dec!(5), ..TradingConfig::default() };
        config
    }

    #[tokio::test]
    async fn place_order_rounds_precision_before_submission() {
        let adapter = Arc::new(StubAdapter { balance_total: Mutex::new(dec!(100000)), ..Default::default() });
        let sink = Arc::new(StubSink::default());
        let engine = LiveTradingEngine::new(adapter.clone() as Arc<dyn ExchangeAdapter>, sink as Arc<dyn PersistenceSink>, config());

        let request = OrderRequestOpen::new(Symbol::new("ETH_USDC_PERP"), OrderSide::Buy, OrderKind::Limit, dec!(0.03125), Some(dec!(2000.017)), false, false, None);
        let order = engine.place_order(request, dec!(2000), Some(dec!(100000))).await.unwrap();

        assert_eq!(order.quantity, dec!(0.031));
        assert_eq!(order.price, Some(dec!(2000.02)));
    }

    #[tokio::test]
    async fn place_order_is_vetoed_when_margin_exceeds_the_capital_limit() {
        let adapter = Arc::new(StubAdapter::default());
        let sink = Arc::new(StubSink::default());
        let engine = LiveTradingEngine::new(adapter as Arc<dyn ExchangeAdapter>, sink as Arc<dyn PersistenceSink>, config());

        let request = OrderRequestOpen::new(Symbol::new("ETH_USDC_PERP"), OrderSide::Buy, OrderKind::Limit, dec!(10), Some(dec!(2000)), false, false, None);
        let outcome = engine.place_order(request, dec!(2000), Some(dec!(1000))).await;

        assert!(matches!(outcome, Err(EngineError::RiskViolation(_))));
        assert!(engine.open_orders().is_empty());
    }

    #[tokio::test]
    async fn stop_re_raises_a_fatal_error_latched_by_an_earlier_submission() {
        let adapter = Arc::new(StubAdapter { balance_total: Mutex::new(dec!(100000)), ..Default::default() });
        *adapter.fail_markets_unrecoverable.lock() = true;
        let sink = Arc::new(StubSink::default());
        let mut engine = LiveTradingEngine::new(adapter as Arc<dyn ExchangeAdapter>, sink as Arc<dyn PersistenceSink>, config());

        let request = OrderRequestOpen::new(Symbol::new("ETH_USDC_PERP"), OrderSide::Buy, OrderKind::Limit, dec!(1), Some(dec!(2000)), false, false, None);
        let outcome = engine.place_order(request, dec!(2000), Some(dec!(100000))).await;
        assert!(matches!(outcome, Err(EngineError::Fatal(_))));

        assert!(matches!(engine.stop().await, Err(EngineError::Fatal(_))));
    }

    #[tokio::test]
    async fn a_buy_fill_opens_a_long_position_and_a_matching_sell_realizes_pnl() {
        let adapter = Arc::new(StubAdapter { balance_total: Mutex::new(dec!(100000)), ..Default::default() });
        let state = Arc::new(EngineState {
            orders: Mutex::new(StdHashMap::new()),
            positions: Mutex::new(StdHashMap::new()),
            balances: Mutex::new(StdHashMap::new()),
            risk: Mutex::new(RiskManager::new(TradingConfig::default())),
            id_gen: Mutex::new(OrderIdGenerator::default()),
            precision: PrecisionCache::new(),
            fatal: Mutex::new(None),
        });
        let sink: Arc<dyn PersistenceSink> = Arc::new(StubSink::default());
        let adapter_dyn: Arc<dyn ExchangeAdapter> = adapter;

        let buy = OrderRequestOpen::new(Symbol::new("ETH_USDC_PERP"), OrderSide::Buy, OrderKind::Market, dec!(1), Some(dec!(2000)), false, false, None);
        let buy_order = submit_order(buy, &adapter_dyn, &sink, &state, None).await.unwrap();
        handle_fill(buy_order, &adapter_dyn, &sink, &state).await;

        let position = state.positions.lock().get(&Symbol::new("ETH_USDC_PERP")).cloned().unwrap();
        assert_eq!(position.side, PositionSide::Long);
        assert_eq!(position.quantity, dec!(1));

        let sell = OrderRequestOpen::new(Symbol::new("ETH_USDC_PERP"), OrderSide::Sell, OrderKind::Market, dec!(1), Some(dec!(2100)), true, false, None);
        let sell_order = submit_order(sell, &adapter_dyn, &sink, &state, None).await.unwrap();
        handle_fill(sell_order, &adapter_dyn, &sink, &state).await;

        assert!(state.positions.lock().get(&Symbol::new("ETH_USDC_PERP")).is_none());
        assert_eq!(state.risk.lock().daily_pnl(), dec!(100));
    }

    #[tokio::test(start_paused = true)]
    async fn start_and_stop_runs_every_background_loop_without_panicking() {
        let adapter = Arc::new(StubAdapter { balance_total: Mutex::new(dec!(50000)), ..Default::default() });
        let sink = Arc::new(StubSink::default());
        let mut engine = LiveTradingEngine::new(adapter as Arc<dyn ExchangeAdapter>, sink.clone() as Arc<dyn PersistenceSink>, config());

        let (_tx, rx) = mpsc::unbounded_channel();
        engine.start(Box::new(NoSignalStrategy), rx).await;

        tokio::time::advance(Duration::from_secs(61)).await;
        engine.stop().await.unwrap();

        assert!(!sink.snapshots.lock().is_empty());
    }

    struct NoSignalStrategy;

    #[async_trait]
    impl Strategy for NoSignalStrategy {
        async fn calculate_signal(&mut self, _market_data: &StdHashMap<Symbol, KlineSeries>) -> Result<Vec<Signal>, helix_strategy::StrategyError> {
            Ok(Vec::new())
        }
        fn should_exit_position(&self, _position: &Position, _current_row: &ExecKline) -> bool {
            false
        }
    }
}
