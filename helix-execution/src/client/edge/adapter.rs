//! [`ExchangeAdapter`] implementation over the EdDSA-over-sorted-params regime (spec §4.A
//! regime 1), grounded on the reference exchange's REST surface: `/api/v1/markets`,
//! `/api/v1/ticker`, `/api/v1/depth`, `/api/v1/klines` public, `/api/v1/account`,
//! `/api/v1/capital`, `/api/v1/position`, `/api/v1/orders`, `/api/v1/order` private.

use super::{EdgeSigner, ParamValue};
use crate::{
    adapter::{Depth, DepthLevel, ExchangeAdapter, Kline, MarketInfo, Ticker},
    balance::{AssetBalance, Balance},
    error::ExecutionError,
    order::{Order, OrderIdGenerator, OrderKind, OrderRequestOpen, OrderSide, OrderStatus, VenueOrderId},
    position::{Position, PositionSide},
    precision::{PrecisionCache, PrecisionRule},
};
use async_trait::async_trait;
use chrono::Utc;
use helix_instrument::{asset::Asset, symbol::{Symbol, SymbolTranslator}};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

struct EdgeTranslator;

impl SymbolTranslator for EdgeTranslator {
    fn default_quote(&self) -> &str {
        "USDC"
    }

    fn venue_form(&self, base: &str, quote: &str) -> Symbol {
        Symbol::new(format!("{base}_{quote}_PERP"))
    }
}

/// `ExchangeAdapter` over the EdDSA-over-sorted-params venue.
pub struct EdgeAdapter {
    http: reqwest::Client,
    base_url: String,
    signer: EdgeSigner,
    translator: EdgeTranslator,
    precision: PrecisionCache,
    order_ids: Mutex<OrderIdGenerator>,
}

impl EdgeAdapter {
    pub fn new(base_url: String, signer: EdgeSigner) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            signer,
            translator: EdgeTranslator,
            precision: PrecisionCache::new(),
            order_ids: Mutex::new(OrderIdGenerator::default()),
        }
    }

    async fn public_get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExecutionError> {
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .query(query)
            .send()
            .await
            .map_err(|error| ExecutionError::ExchangeUnreachable(error.into()))?;

        decode_response(response).await
    }

    async fn signed<T: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        path: &str,
        instruction: &str,
        params: BTreeMap<String, ParamValue>,
        body: Option<Value>,
    ) -> Result<T, ExecutionError> {
        let headers = self.signer.sign(instruction, &params);

        let mut request = self
            .http
            .request(method, format!("{}{path}", self.base_url))
            .header("X-API-Key", &headers.public_key_b64)
            .header("X-Signature", &headers.signature_b64)
            .header("X-Timestamp", headers.timestamp_ms.to_string())
            .header("X-Window", headers.window_ms.to_string());

        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|error| ExecutionError::ExchangeUnreachable(error.into()))?;

        decode_response(response).await
    }

    /// Rounds a request's quantity/price to this symbol's cached precision rule, fetching and
    /// caching it first if absent (spec §4.A: "rounding rules are queried once per symbol").
    async fn apply_precision(&self, symbol: &Symbol, request: &mut OrderRequestOpen) -> Result<(), ExecutionError> {
        let rule = match self.precision.get(symbol) {
            Some(rule) => rule,
            None => {
                let markets = self.get_markets().await?;
                let info = markets
                    .iter()
                    .find(|(sym, _)| sym == symbol)
                    .map(|(_, info)| info)
                    .ok_or_else(|| ExecutionError::UnknownSymbol(symbol.to_string()))?;
                let rule = PrecisionRule {
                    lot_size: info.lot_size,
                    tick_size: info.price_tick,
                    min_notional: info.min_notional,
                };
                self.precision.put(symbol.clone(), rule);
                rule
            }
        };

        request.quantity = rule.round_quantity(request.quantity);
        if let Some(price) = request.price {
            request.price = Some(rule.round_price(price));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RawMarket {
    symbol: String,
    #[serde(default)]
    base_symbol: Option<String>,
    #[serde(default)]
    quote_symbol: Option<String>,
    #[serde(default)]
    price_tick_size: Option<Decimal>,
    #[serde(default)]
    quantity_tick_size: Option<Decimal>,
    #[serde(default)]
    min_notional: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct RawTicker {
    symbol: String,
    last_price: Decimal,
    high_price: Decimal,
    low_price: Decimal,
    volume: Decimal,
}

#[derive(Debug, Deserialize)]
struct RawDepthLevel(Decimal, Decimal);

#[derive(Debug, Deserialize)]
struct RawDepth {
    bids: Vec<RawDepthLevel>,
    asks: Vec<RawDepthLevel>,
}

#[derive(Debug, Deserialize)]
struct RawKline {
    #[serde(rename = "start")]
    open_time_ms: i64,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
}

#[derive(Debug, Deserialize)]
struct RawBalance {
    asset: String,
    available: Decimal,
    #[serde(default)]
    total: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct RawPosition {
    symbol: String,
    #[serde(rename = "netQuantity")]
    net_quantity: Decimal,
    #[serde(rename = "entryPrice")]
    entry_price: Decimal,
    #[serde(rename = "markPrice")]
    mark_price: Decimal,
    #[serde(rename = "pnlUnrealized", default)]
    unrealized_pnl: Decimal,
    #[serde(rename = "pnlRealized", default)]
    realized_pnl: Decimal,
}

#[derive(Debug, Deserialize)]
struct RawOrder {
    #[serde(rename = "orderId")]
    order_id: String,
    symbol: String,
    side: String,
    #[serde(rename = "orderType")]
    order_type: String,
    quantity: Decimal,
    #[serde(default)]
    price: Option<Decimal>,
    #[serde(rename = "reduceOnly", default)]
    reduce_only: bool,
    #[serde(rename = "postOnly", default)]
    post_only: bool,
    status: String,
    #[serde(rename = "executedQuantity", default)]
    executed_quantity: Decimal,
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
    if status.as_u16() == 429 {
        return Err(ExecutionError::RateLimited);
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

fn order_side_to_venue(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "Bid",
        OrderSide::Sell => "Ask",
    }
}

fn order_kind_to_venue(kind: OrderKind) -> &'static str {
    match kind {
        OrderKind::Market => "Market",
        OrderKind::Limit => "Limit",
        OrderKind::ImmediateOrCancel => "Limit",
        OrderKind::FillOrKill => "Limit",
    }
}

fn venue_status_to_local(status: &str) -> OrderStatus {
    match status.to_uppercase().as_str() {
        "FILLED" | "COMPLETE" => OrderStatus::Filled,
        "OPEN" | "RESTING" | "PENDING" | "NEW" => OrderStatus::Open,
        "CANCELLED" | "CANCELED" | "EXPIRED" => OrderStatus::Cancelled,
        "REJECTED" => OrderStatus::Rejected,
        _ => OrderStatus::Open,
    }
}

#[async_trait]
impl ExchangeAdapter for EdgeAdapter {
    fn id(&self) -> &'static str {
        "edge"
    }

    fn canonicalise(&self, symbol: &Symbol) -> Symbol {
        self.translator.to_venue(symbol)
    }

    async fn get_markets(&self) -> Result<Vec<(Symbol, MarketInfo)>, ExecutionError> {
        let raw: Vec<RawMarket> = self.public_get("/api/v1/markets", &[]).await?;
        Ok(raw
            .into_iter()
            .map(|market| {
                let price_tick = market.price_tick_size.unwrap_or(Decimal::new(1, 2));
                let lot_size = market.quantity_tick_size.unwrap_or(Decimal::new(1, 3));
                let info = MarketInfo {
                    base: Asset::new_from_exchange(market.base_symbol.unwrap_or_else(|| market.symbol.clone())),
                    quote: Asset::new_from_exchange(market.quote_symbol.unwrap_or_else(|| "USDC".to_string())),
                    price_tick,
                    lot_size,
                    min_notional: market.min_notional.unwrap_or(Decimal::new(5, 0)),
                    price_precision: price_tick.scale(),
                    quantity_precision: lot_size.scale(),
                };
                (Symbol::new(market.symbol), info)
            })
            .collect())
    }

    async fn get_ticker(&self, symbol: &Symbol) -> Result<Ticker, ExecutionError> {
        let venue_symbol = self.canonicalise(symbol);
        let raw: RawTicker = self
            .public_get("/api/v1/ticker", &[("symbol", venue_symbol.to_string())])
            .await?;
        Ok(Ticker {
            symbol: Symbol::new(raw.symbol),
            last_price: raw.last_price,
            high_price: raw.high_price,
            low_price: raw.low_price,
            volume: raw.volume,
            time_exchange: Utc::now(),
        })
    }

    async fn get_depth(&self, symbol: &Symbol, limit: u32) -> Result<Depth, ExecutionError> {
        let venue_symbol = self.canonicalise(symbol);
        let raw: RawDepth = self
            .public_get(
                "/api/v1/depth",
                &[("symbol", venue_symbol.to_string()), ("limit", limit.to_string())],
            )
            .await?;
        Ok(Depth {
            bids: raw.bids.into_iter().map(|l| DepthLevel { price: l.0, quantity: l.1 }).collect(),
            asks: raw.asks.into_iter().map(|l| DepthLevel { price: l.0, quantity: l.1 }).collect(),
        })
    }

    async fn get_klines(
        &self,
        symbol: &Symbol,
        interval: &str,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Kline>, ExecutionError> {
        let venue_symbol = self.canonicalise(symbol);
        let mut query = vec![
            ("symbol", venue_symbol.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(start_ms) = start_ms {
            query.push(("startTime", (start_ms / 1000).to_string()));
        }
        if let Some(end_ms) = end_ms {
            query.push(("endTime", (end_ms / 1000).to_string()));
        }

        let raw: Vec<RawKline> = self.public_get("/api/v1/klines", &query).await?;
        Ok(raw
            .into_iter()
            .map(|k| Kline {
                open_time_ms: k.open_time_ms * 1000,
                open: k.open,
                high: k.high,
                low: k.low,
                close: k.close,
                volume: k.volume,
            })
            .collect())
    }

    async fn get_server_time(&self) -> Result<i64, ExecutionError> {
        Ok(Utc::now().timestamp_millis())
    }

    async fn get_balance(&self) -> Result<Vec<AssetBalance<Asset>>, ExecutionError> {
        let raw: Vec<RawBalance> = self
            .signed(reqwest::Method::GET, "/api/v1/capital", "balanceQuery", BTreeMap::new(), None)
            .await?;
        let now = Utc::now();
        Ok(raw
            .into_iter()
            .map(|b| AssetBalance {
                asset: Asset::new_from_exchange(b.asset),
                balance: Balance { total: b.total.unwrap_or(b.available), free: b.available },
                time_exchange: now,
            })
            .collect())
    }

    async fn get_positions(&self, symbol: Option<&Symbol>) -> Result<Vec<Position>, ExecutionError> {
        let mut params = BTreeMap::new();
        if let Some(symbol) = symbol {
            params.insert("symbol".to_string(), ParamValue::Text(self.canonicalise(symbol).to_string()));
        }
        let raw: Vec<RawPosition> = self
            .signed(reqwest::Method::GET, "/api/v1/position", "positionQuery", params, None)
            .await?;
        let now = Utc::now();
        Ok(raw
            .into_iter()
            .filter(|p| !p.net_quantity.is_zero())
            .map(|p| Position {
                symbol: Symbol::new(p.symbol),
                side: if p.net_quantity.is_sign_positive() { PositionSide::Long } else { PositionSide::Short },
                quantity: p.net_quantity.abs(),
                entry_price: p.entry_price,
                mark_price: p.mark_price,
                unrealized_pnl: p.unrealized_pnl,
                realized_pnl: p.realized_pnl,
                created_at: now,
                updated_at: now,
            })
            .collect())
    }

    async fn execute_order(&self, mut request: OrderRequestOpen) -> Result<Order, ExecutionError> {
        request.symbol = self.canonicalise(&request.symbol);
        let symbol = request.symbol.clone();
        self.apply_precision(&symbol, &mut request).await?;

        let mut order_data = json!({
            "symbol": request.symbol.to_string(),
            "side": order_side_to_venue(request.side),
            "orderType": order_kind_to_venue(request.kind),
            "quantity": request.quantity.to_string(),
        });
        if let Some(price) = request.price {
            order_data["price"] = json!(price.to_string());
        }
        if request.reduce_only {
            order_data["reduceOnly"] = json!(true);
        }
        if request.post_only {
            order_data["postOnly"] = json!(true);
        }

        let mut params = BTreeMap::new();
        params.insert("reduceOnly".to_string(), ParamValue::Bool(request.reduce_only));

        let raw: RawOrder = self
            .signed(reqwest::Method::POST, "/api/v1/orders", "orderExecute", params, Some(json!([order_data])))
            .await?;

        let id = self.order_ids.lock().next(Utc::now());
        let mut order = Order::new_open(id, VenueOrderId::new(raw.order_id), request, Utc::now());
        order.status = venue_status_to_local(&raw.status);
        order.filled_quantity = raw.executed_quantity;
        Ok(order)
    }

    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> Result<Vec<Order>, ExecutionError> {
        let mut params = BTreeMap::new();
        if let Some(symbol) = symbol {
            params.insert("symbol".to_string(), ParamValue::Text(self.canonicalise(symbol).to_string()));
        }
        let raw: Vec<RawOrder> = self
            .signed(reqwest::Method::GET, "/api/v1/orders", "orderQueryAll", params, None)
            .await?;
        Ok(raw.into_iter().map(|o| raw_order_to_snapshot(o, &self.order_ids)).collect())
    }

    async fn get_order(&self, id: &VenueOrderId, symbol: &Symbol) -> Result<Order, ExecutionError> {
        let mut params = BTreeMap::new();
        params.insert("orderId".to_string(), ParamValue::Text(id.0.clone()));
        params.insert("symbol".to_string(), ParamValue::Text(self.canonicalise(symbol).to_string()));
        let raw: RawOrder = self
            .signed(reqwest::Method::GET, "/api/v1/order", "orderQuery", params, None)
            .await?;
        Ok(raw_order_to_snapshot(raw, &self.order_ids))
    }

    async fn cancel_order(&self, symbol: &Symbol, id: &VenueOrderId) -> Result<(), ExecutionError> {
        let mut params = BTreeMap::new();
        params.insert("symbol".to_string(), ParamValue::Text(self.canonicalise(symbol).to_string()));
        params.insert("orderId".to_string(), ParamValue::Text(id.0.clone()));
        let _: Value = self
            .signed(reqwest::Method::DELETE, "/api/v1/order", "orderCancel", params, None)
            .await?;
        Ok(())
    }

    async fn cancel_all_orders(&self, symbol: Option<&Symbol>) -> Result<(), ExecutionError> {
        let mut params = BTreeMap::new();
        if let Some(symbol) = symbol {
            params.insert("symbol".to_string(), ParamValue::Text(self.canonicalise(symbol).to_string()));
        }
        let _: Value = self
            .signed(reqwest::Method::DELETE, "/api/v1/orders", "orderCancel", params, None)
            .await?;
        Ok(())
    }
}

fn raw_order_to_snapshot(raw: RawOrder, order_ids: &Mutex<OrderIdGenerator>) -> Order {
    let id = order_ids.lock().next(Utc::now());
    let now = Utc::now();
    Order {
        id,
        venue_id: Some(VenueOrderId::new(raw.order_id)),
        symbol: Symbol::new(raw.symbol),
        side: if raw.side.eq_ignore_ascii_case("bid") { OrderSide::Buy } else { OrderSide::Sell },
        kind: if raw.order_type.eq_ignore_ascii_case("market") { OrderKind::Market } else { OrderKind::Limit },
        quantity: raw.quantity,
        price: raw.price,
        reduce_only: raw.reduce_only,
        post_only: raw.post_only,
        status: venue_status_to_local(&raw.status),
        filled_quantity: raw.executed_quantity,
        commission: Decimal::ZERO,
        originating_signal: None,
        created_at: now,
        updated_at: now,
        filled_at: None,
        not_found_strikes: 0,
    }
}
