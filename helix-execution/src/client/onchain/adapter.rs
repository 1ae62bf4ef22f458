//! [`ExchangeAdapter`] implementation over the EIP-712-typed-data-over-action+nonce regime
//! (spec §4.A regime 3), grounded on the on-chain perpetuals venue's `/info` (public) and
//! `/exchange` (signed) REST split and its `{a, b, p, s, r, t}` order field order, which the
//! `connectionId` hash is sensitive to (see [`super::OnchainSigner`]).

use super::{ActionField, OnchainSigner};
use crate::{
    adapter::{Depth, DepthLevel, ExchangeAdapter, Kline, MarketInfo, Ticker},
    balance::{AssetBalance, Balance},
    error::ExecutionError,
    order::{Order, OrderIdGenerator, OrderKind, OrderRequestOpen, OrderSide, OrderStatus, VenueOrderId},
    position::{Position, PositionSide},
};
use async_trait::async_trait;
use chrono::Utc;
use helix_instrument::{asset::Asset, symbol::{Symbol, SymbolTranslator}};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

struct OnchainTranslator;

impl SymbolTranslator for OnchainTranslator {
    fn default_quote(&self) -> &str {
        "USD"
    }

    fn venue_form(&self, base: &str, _quote: &str) -> Symbol {
        Symbol::new(base.to_string())
    }

    /// This venue has no quote leg in its native form (the `universe` is base-asset-only), so
    /// the canonical round-trip always reconstructs `{base}_USD` rather than re-deriving the
    /// quote from the venue string.
    fn to_canonical(&self, symbol: &Symbol) -> Symbol {
        let parts = helix_instrument::symbol::SymbolParts::parse(symbol.as_str());
        Symbol::new(format!("{}_USD", parts.base))
    }
}

/// A trade this adapter opened, cached so the grid engine's stop procedure can close it
/// without a `get_positions` round trip (spec §4.F, "cached `(pair_id, trade_index)` tuples
/// for the on-chain adapter").
struct CachedTrade {
    pair_id: String,
    trade_index: u64,
    side: OrderSide,
    quantity: Decimal,
}

/// `ExchangeAdapter` over the EIP-712-typed-data venue. Does not natively expose a
/// "position" entity distinct from the signed order book, so `cached_close_refs` and
/// `supports_native_positions` both reflect a synthetic reduce-only close path.
pub struct OnchainAdapter {
    http: reqwest::Client,
    info_url: String,
    exchange_url: String,
    signer: OnchainSigner,
    translator: OnchainTranslator,
    nonce: AtomicU64,
    order_ids: Mutex<OrderIdGenerator>,
    open_trades: Mutex<Vec<(VenueOrderId, CachedTrade)>>,
}

impl OnchainAdapter {
    pub fn new(base_url: String, signer: OnchainSigner) -> Self {
        Self {
            http: reqwest::Client::new(),
            info_url: format!("{base_url}/info"),
            exchange_url: format!("{base_url}/exchange"),
            signer,
            translator: OnchainTranslator,
            nonce: AtomicU64::new(Utc::now().timestamp_millis() as u64),
            order_ids: Mutex::new(OrderIdGenerator::default()),
            open_trades: Mutex::new(Vec::new()),
        }
    }

    async fn post_info<T: for<'de> Deserialize<'de>>(&self, body: Value) -> Result<T, ExecutionError> {
        let response = self
            .http
            .post(&self.info_url)
            .json(&body)
            .send()
            .await
            .map_err(|error| ExecutionError::ExchangeUnreachable(error.into()))?;
        decode_response(response).await
    }

    async fn meta(&self) -> Result<Meta, ExecutionError> {
        self.post_info(json!({ "type": "meta" })).await
    }

    fn next_nonce(&self) -> u64 {
        self.nonce.fetch_add(1, Ordering::SeqCst)
    }

    /// Sign `action` and submit it to `/exchange`, returning the raw response body.
    async fn submit_action(&self, action: Vec<ActionField>, nonce: u64) -> Result<Value, ExecutionError> {
        let signature = self
            .signer
            .sign_action(&action, nonce, false)
            .await
            .map_err(|error| ExecutionError::OrderRejected(error.to_string()))?;

        let action_value: Value = Value::Object(action.into_iter().collect());
        let body = json!({
            "action": action_value,
            "nonce": nonce,
            "signature": {
                "r": format!("{:#x}", signature.r),
                "s": format!("{:#x}", signature.s),
                "v": signature.v,
            },
        });

        let response = self
            .http
            .post(&self.exchange_url)
            .json(&body)
            .send()
            .await
            .map_err(|error| ExecutionError::ExchangeUnreachable(error.into()))?;
        decode_response(response).await
    }
}

#[derive(Debug, Deserialize)]
struct MetaAsset {
    name: String,
    #[serde(rename = "szDecimals")]
    sz_decimals: u32,
}

#[derive(Debug, Deserialize)]
struct Meta {
    universe: Vec<MetaAsset>,
}

#[derive(Debug, Deserialize)]
struct ClearinghouseState {
    #[serde(rename = "assetPositions", default)]
    asset_positions: Vec<AssetPositionEntry>,
    #[serde(rename = "marginSummary")]
    margin_summary: MarginSummary,
}

#[derive(Debug, Deserialize)]
struct MarginSummary {
    #[serde(rename = "accountValue")]
    account_value: Decimal,
}

#[derive(Debug, Deserialize)]
struct AssetPositionEntry {
    position: RawPosition,
}

#[derive(Debug, Deserialize)]
struct RawPosition {
    coin: String,
    szi: Decimal,
    #[serde(rename = "entryPx")]
    entry_px: Decimal,
    #[serde(rename = "unrealizedPnl", default)]
    unrealized_pnl: Decimal,
}

async fn decode_response<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, ExecutionError> {
    let status = response.status();
    let payload = response
        .bytes()
        .await
        .map_err(|error| ExecutionError::ExchangeUnreachable(error.into()))?;

    if status.as_u16() == 404 {
        return Err(ExecutionError::NotFound(String::from_utf8_lossy(&payload).into_owned()));
    }
    if !status.is_success() {
        return Err(ExecutionError::OrderRejected(String::from_utf8_lossy(&payload).into_owned()));
    }

    serde_json::from_slice(&payload).map_err(|error| {
        ExecutionError::ExchangeUnreachable(helix_integration::error::SocketError::DeserialiseBinary {
            error,
            payload: payload.to_vec(),
        })
    })
}

fn format_decimal(value: Decimal, decimals: u32) -> String {
    value.round_dp(decimals).normalize().to_string()
}

#[async_trait]
impl ExchangeAdapter for OnchainAdapter {
    fn id(&self) -> &'static str {
        "onchain"
    }

    fn canonicalise(&self, symbol: &Symbol) -> Symbol {
        self.translator.to_venue(symbol)
    }

    async fn get_markets(&self) -> Result<Vec<(Symbol, MarketInfo)>, ExecutionError> {
        let meta = self.meta().await?;
        Ok(meta
            .universe
            .into_iter()
            .map(|asset| {
                let lot_size = Decimal::new(1, asset.sz_decimals);
                let info = MarketInfo {
                    base: Asset::new_from_exchange(asset.name.clone()),
                    quote: Asset::new_from_exchange("USD"),
                    price_tick: Decimal::new(1, 1),
                    lot_size,
                    min_notional: Decimal::TEN,
                    price_precision: 1,
                    quantity_precision: asset.sz_decimals,
                };
                (self.translator.to_canonical(&Symbol::new(asset.name)), info)
            })
            .collect())
    }

    async fn get_ticker(&self, symbol: &Symbol) -> Result<Ticker, ExecutionError> {
        let venue_symbol = self.canonicalise(symbol);
        let mids: std::collections::HashMap<String, Decimal> = self.post_info(json!({ "type": "allMids" })).await?;
        let price = mids
            .get(venue_symbol.as_str())
            .copied()
            .ok_or_else(|| ExecutionError::UnknownSymbol(symbol.to_string()))?;
        Ok(Ticker {
            symbol: symbol.clone(),
            last_price: price,
            high_price: price,
            low_price: price,
            volume: Decimal::ZERO,
            time_exchange: Utc::now(),
        })
    }

    async fn get_depth(&self, symbol: &Symbol, _limit: u32) -> Result<Depth, ExecutionError> {
        let venue_symbol = self.canonicalise(symbol);
        let raw: Value = self
            .post_info(json!({ "type": "l2Book", "coin": venue_symbol.to_string() }))
            .await?;

        let parse_levels = |key: usize| -> Vec<DepthLevel> {
            raw.get("levels")
                .and_then(|levels| levels.get(key))
                .and_then(Value::as_array)
                .map(|levels| {
                    levels
                        .iter()
                        .filter_map(|level| {
                            let price = level.get("px")?.as_str()?.parse().ok()?;
                            let quantity = level.get("sz")?.as_str()?.parse().ok()?;
                            Some(DepthLevel { price, quantity })
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        Ok(Depth { bids: parse_levels(0), asks: parse_levels(1) })
    }

    async fn get_klines(
        &self,
        symbol: &Symbol,
        interval: &str,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        _limit: u32,
    ) -> Result<Vec<Kline>, ExecutionError> {
        let venue_symbol = self.canonicalise(symbol);
        let end_time = end_ms.unwrap_or_else(|| Utc::now().timestamp_millis());
        let start_time = start_ms.unwrap_or(end_time - 1_000 * 60 * 60 * 24);

        let raw: Vec<Value> = self
            .post_info(json!({
                "type": "candleSnapshot",
                "req": { "coin": venue_symbol.to_string(), "interval": interval, "startTime": start_time, "endTime": end_time },
            }))
            .await?;

        Ok(raw
            .into_iter()
            .filter_map(|row| {
                Some(Kline {
                    open_time_ms: row.get("t")?.as_i64()?,
                    open: row.get("o")?.as_str()?.parse().ok()?,
                    high: row.get("h")?.as_str()?.parse().ok()?,
                    low: row.get("l")?.as_str()?.parse().ok()?,
                    close: row.get("c")?.as_str()?.parse().ok()?,
                    volume: row.get("v")?.as_str()?.parse().ok()?,
                })
            })
            .collect())
    }

    async fn get_server_time(&self) -> Result<i64, ExecutionError> {
        Ok(Utc::now().timestamp_millis())
    }

    async fn get_balance(&self) -> Result<Vec<AssetBalance<Asset>>, ExecutionError> {
        let state: ClearinghouseState = self
            .post_info(json!({ "type": "clearinghouseState", "user": format!("{:#x}", self.signer.address()) }))
            .await?;
        let total = state.margin_summary.account_value;
        Ok(vec![AssetBalance {
            asset: Asset::new_from_exchange("USD"),
            balance: Balance { total, free: total },
            time_exchange: Utc::now(),
        }])
    }

    async fn get_positions(&self, symbol: Option<&Symbol>) -> Result<Vec<Position>, ExecutionError> {
        let state: ClearinghouseState = self
            .post_info(json!({ "type": "clearinghouseState", "user": format!("{:#x}", self.signer.address()) }))
            .await?;
        let now = Utc::now();
        Ok(state
            .asset_positions
            .into_iter()
            .map(|entry| entry.position)
            .filter(|position| !position.szi.is_zero())
            .map(|position| {
                let canonical = self.translator.to_canonical(&Symbol::new(position.coin));
                Position {
                    symbol: canonical,
                    side: if position.szi.is_sign_positive() { PositionSide::Long } else { PositionSide::Short },
                    quantity: position.szi.abs(),
                    entry_price: position.entry_px,
                    mark_price: position.entry_px,
                    unrealized_pnl: position.unrealized_pnl,
                    realized_pnl: Decimal::ZERO,
                    created_at: now,
                    updated_at: now,
                }
            })
            .filter(|position| symbol.is_none_or(|s| s == &position.symbol))
            .collect())
    }

    async fn execute_order(&self, mut request: OrderRequestOpen) -> Result<Order, ExecutionError> {
        request.symbol = self.translator.to_canonical(&request.symbol);
        let venue_symbol = self.canonicalise(&request.symbol);

        let meta = self.meta().await?;
        let asset_index = meta
            .universe
            .iter()
            .position(|asset| asset.name == venue_symbol.as_str())
            .ok_or_else(|| ExecutionError::UnknownSymbol(request.symbol.to_string()))?;
        let sz_decimals = meta.universe[asset_index].sz_decimals;

        let price = request.price.unwrap_or(Decimal::ZERO);
        let time_in_force = if request.kind == OrderKind::Market { "Ioc" } else { "Gtc" };

        // Field order is load-bearing for the connectionId hash: `a, b, p, s, r, t`.
        let order_fields: Vec<ActionField> = vec![
            ("a".to_string(), json!(asset_index)),
            ("b".to_string(), json!(request.side == OrderSide::Buy)),
            ("p".to_string(), json!(format_decimal(price, 1))),
            ("s".to_string(), json!(format_decimal(request.quantity, sz_decimals))),
            ("r".to_string(), json!(request.reduce_only)),
            ("t".to_string(), json!({ "limit": { "tif": time_in_force } })),
        ];
        let action: Vec<ActionField> = vec![
            ("type".to_string(), json!("order")),
            ("orders".to_string(), json!([order_fields.iter().cloned().collect::<serde_json::Map<_, _>>()])),
            ("grouping".to_string(), json!("na")),
        ];

        let nonce = self.next_nonce();
        let response = self.submit_action(action, nonce).await?;

        let order_id = response
            .pointer("/response/data/statuses/0/resting/oid")
            .or_else(|| response.pointer("/response/data/statuses/0/filled/oid"))
            .and_then(Value::as_u64)
            .map(|oid| oid.to_string())
            .unwrap_or_else(|| nonce.to_string());
        let venue_id = VenueOrderId::new(order_id.clone());

        let trade_index = order_id.parse().unwrap_or(nonce);
        self.open_trades.lock().push((
            venue_id.clone(),
            CachedTrade { pair_id: asset_index.to_string(), trade_index, side: request.side, quantity: request.quantity },
        ));

        let id = self.order_ids.lock().next(Utc::now());
        let order = Order::new_open(id, venue_id, request, Utc::now());
        Ok(order)
    }

    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> Result<Vec<Order>, ExecutionError> {
        let raw: Vec<Value> = self
            .post_info(json!({ "type": "openOrders", "user": format!("{:#x}", self.signer.address()) }))
            .await?;
        let now = Utc::now();
        Ok(raw
            .into_iter()
            .filter_map(|row| {
                let coin = row.get("coin")?.as_str()?.to_string();
                let canonical = self.translator.to_canonical(&Symbol::new(coin));
                if symbol.is_some_and(|s| s != &canonical) {
                    return None;
                }
                let id = self.order_ids.lock().next(now);
                Some(Order {
                    id,
                    venue_id: Some(VenueOrderId::new(row.get("oid")?.as_u64()?.to_string())),
                    symbol: canonical,
                    side: if row.get("side")?.as_str()? == "B" { OrderSide::Buy } else { OrderSide::Sell },
                    kind: OrderKind::Limit,
                    quantity: row.get("sz")?.as_str()?.parse().ok()?,
                    price: row.get("limitPx")?.as_str()?.parse().ok(),
                    reduce_only: row.get("reduceOnly").and_then(Value::as_bool).unwrap_or(false),
                    post_only: false,
                    status: OrderStatus::Open,
                    filled_quantity: Decimal::ZERO,
                    commission: Decimal::ZERO,
                    originating_signal: None,
                    created_at: now,
                    updated_at: now,
                    filled_at: None,
                    not_found_strikes: 0,
                })
            })
            .collect())
    }

    async fn get_order(&self, id: &VenueOrderId, symbol: &Symbol) -> Result<Order, ExecutionError> {
        let oid: u64 = id.0.parse().map_err(|_| ExecutionError::NotFound(id.0.clone()))?;
        let response: Value = self
            .post_info(json!({ "type": "orderStatus", "user": format!("{:#x}", self.signer.address()), "oid": oid }))
            .await?;

        let status_value = response
            .get("order")
            .ok_or_else(|| ExecutionError::NotFound(id.0.clone()))?;

        let now = Utc::now();
        let local_id = self.order_ids.lock().next(now);
        Ok(Order {
            id: local_id,
            venue_id: Some(id.clone()),
            symbol: symbol.clone(),
            side: if status_value.get("side").and_then(Value::as_str) == Some("B") { OrderSide::Buy } else { OrderSide::Sell },
            kind: OrderKind::Limit,
            quantity: status_value.get("sz").and_then(Value::as_str).and_then(|s| s.parse().ok()).unwrap_or(Decimal::ZERO),
            price: status_value.get("limitPx").and_then(Value::as_str).and_then(|s| s.parse().ok()),
            reduce_only: false,
            post_only: false,
            status: match response.get("status").and_then(Value::as_str) {
                Some("filled") => OrderStatus::Filled,
                Some("canceled") => OrderStatus::Cancelled,
                _ => OrderStatus::Open,
            },
            filled_quantity: Decimal::ZERO,
            commission: Decimal::ZERO,
            originating_signal: None,
            created_at: now,
            updated_at: now,
            filled_at: None,
            not_found_strikes: 0,
        })
    }

    async fn cancel_order(&self, symbol: &Symbol, id: &VenueOrderId) -> Result<(), ExecutionError> {
        let venue_symbol = self.canonicalise(symbol);
        let meta = self.meta().await?;
        let asset_index = meta
            .universe
            .iter()
            .position(|asset| asset.name == venue_symbol.as_str())
            .ok_or_else(|| ExecutionError::UnknownSymbol(symbol.to_string()))?;
        let oid: u64 = id.0.parse().map_err(|_| ExecutionError::NotFound(id.0.clone()))?;

        let cancel_fields: Vec<ActionField> = vec![("a".to_string(), json!(asset_index)), ("o".to_string(), json!(oid))];
        let action: Vec<ActionField> = vec![
            ("type".to_string(), json!("cancel")),
            ("cancels".to_string(), json!([cancel_fields.into_iter().collect::<serde_json::Map<_, _>>()])),
        ];

        let nonce = self.next_nonce();
        self.submit_action(action, nonce).await?;
        Ok(())
    }

    async fn cancel_all_orders(&self, symbol: Option<&Symbol>) -> Result<(), ExecutionError> {
        for order in self.get_open_orders(symbol).await? {
            if let Some(venue_id) = &order.venue_id {
                self.cancel_order(&order.symbol, venue_id).await?;
            }
        }
        Ok(())
    }

    fn supports_native_positions(&self) -> bool {
        false
    }

    fn cached_close_refs(&self) -> Vec<(VenueOrderId, (String, u64))> {
        self.open_trades.lock().iter().map(|(id, trade)| (id.clone(), (trade.pair_id.clone(), trade.trade_index))).collect()
    }

    async fn close_cached_ref(&self, venue_id: &VenueOrderId) -> Result<(), ExecutionError> {
        let trade = {
            let mut open_trades = self.open_trades.lock();
            let index = open_trades
                .iter()
                .position(|(id, _)| id == venue_id)
                .ok_or_else(|| ExecutionError::NotFound(venue_id.0.clone()))?;
            open_trades.remove(index).1
        };

        let meta = self.meta().await?;
        let asset_index: usize = trade.pair_id.parse().map_err(|_| ExecutionError::UnknownSymbol(trade.pair_id.clone()))?;
        let sz_decimals = meta
            .universe
            .get(asset_index)
            .map(|asset| asset.sz_decimals)
            .ok_or_else(|| ExecutionError::UnknownSymbol(trade.pair_id.clone()))?;

        // Closing side is the opposite of the side the cached trade opened with.
        let order_fields: Vec<ActionField> = vec![
            ("a".to_string(), json!(asset_index)),
            ("b".to_string(), json!(trade.side != OrderSide::Buy)),
            ("p".to_string(), json!(format_decimal(Decimal::ZERO, 1))),
            ("s".to_string(), json!(format_decimal(trade.quantity, sz_decimals))),
            ("r".to_string(), json!(true)),
            ("t".to_string(), json!({ "limit": { "tif": "Ioc" } })),
        ];
        let action: Vec<ActionField> = vec![
            ("type".to_string(), json!("order")),
            ("orders".to_string(), json!([order_fields.into_iter().collect::<serde_json::Map<_, _>>()])),
            ("grouping".to_string(), json!("na")),
        ];

        let nonce = self.next_nonce();
        self.submit_action(action, nonce).await?;
        Ok(())
    }
}
