//! [`ExchangeAdapter`] implementation over the HMAC-SHA256-with-passphrase regime (spec §4.A
//! regime 2), grounded on the venue whose OKX-style REST surface speaks `instId`/`posSide`
//! and has no native `cancel_all` (fanned out to individual cancels here, same as the
//! reference client).

use super::CoastalSigner;
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

struct CoastalTranslator;

impl SymbolTranslator for CoastalTranslator {
    fn default_quote(&self) -> &str {
        "USDC"
    }

    fn venue_form(&self, base: &str, quote: &str) -> Symbol {
        Symbol::new(format!("{base}-{quote}-SWAP"))
    }
}

/// `ExchangeAdapter` over the HMAC-SHA256-with-passphrase venue.
pub struct CoastalAdapter {
    http: reqwest::Client,
    base_url: String,
    signer: CoastalSigner,
    translator: CoastalTranslator,
    precision: PrecisionCache,
    order_ids: Mutex<OrderIdGenerator>,
}

impl CoastalAdapter {
    pub fn new(base_url: String, signer: CoastalSigner) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            signer,
            translator: CoastalTranslator,
            precision: PrecisionCache::new(),
            order_ids: Mutex::new(OrderIdGenerator::default()),
        }
    }

    async fn request<T: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<T, ExecutionError> {
        let query_string = query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let path_with_query = if query_string.is_empty() {
            path.to_string()
        } else {
            format!("{path}?{query_string}")
        };
        let compact_body = body.map(|b| b.to_string()).unwrap_or_default();

        let headers = self.signer.sign(method.as_str(), &path_with_query, &compact_body);

        let mut request = self
            .http
            .request(method, format!("{}{path_with_query}", self.base_url))
            .header("DC-ACCESS-KEY", &headers.key)
            .header("DC-ACCESS-SIGN", &headers.signature_hex)
            .header("DC-ACCESS-TIMESTAMP", &headers.timestamp_iso8601)
            .header("DC-ACCESS-PASSPHRASE", &headers.passphrase);

        if !compact_body.is_empty() {
            request = request.body(compact_body).header("Content-Type", "application/json");
        }

        let response = request
            .send()
            .await
            .map_err(|error| ExecutionError::ExchangeUnreachable(error.into()))?;

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
struct RawInstrument {
    #[serde(rename = "instId")]
    inst_id: String,
    #[serde(rename = "baseCcy")]
    base_ccy: String,
    #[serde(rename = "quoteCcy")]
    quote_ccy: String,
    #[serde(rename = "tickSz")]
    tick_sz: Decimal,
    #[serde(rename = "lotSz")]
    lot_sz: Decimal,
    #[serde(rename = "minSz", default)]
    min_sz: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct RawTicker {
    last: Decimal,
    #[serde(rename = "high24h")]
    high_24h: Decimal,
    #[serde(rename = "low24h")]
    low_24h: Decimal,
    #[serde(rename = "vol24h")]
    vol_24h: Decimal,
}

#[derive(Debug, Deserialize)]
struct RawBookLevel(Decimal, Decimal);

#[derive(Debug, Deserialize)]
struct RawBook {
    bids: Vec<RawBookLevel>,
    asks: Vec<RawBookLevel>,
}

#[derive(Debug, Deserialize)]
struct RawCandle(i64, Decimal, Decimal, Decimal, Decimal, Decimal);

#[derive(Debug, Deserialize)]
struct RawBalance {
    ccy: String,
    #[serde(rename = "availBal")]
    avail_bal: Decimal,
    #[serde(rename = "frozenBal", default)]
    frozen_bal: Decimal,
}

#[derive(Debug, Deserialize)]
struct RawPosition {
    #[serde(rename = "instId")]
    inst_id: String,
    #[serde(rename = "posSide")]
    pos_side: String,
    pos: Decimal,
    #[serde(rename = "avgPx")]
    avg_px: Decimal,
    #[serde(rename = "markPx")]
    mark_px: Decimal,
    #[serde(default)]
    upl: Decimal,
    #[serde(rename = "realizedPnl", default)]
    realized_pnl: Decimal,
}

#[derive(Debug, Deserialize)]
struct RawOrder {
    #[serde(rename = "ordId")]
    ord_id: String,
    #[serde(rename = "instId")]
    inst_id: String,
    side: String,
    #[serde(rename = "ordType")]
    ord_type: String,
    sz: Decimal,
    #[serde(default)]
    px: Option<Decimal>,
    #[serde(default)]
    state: String,
    #[serde(rename = "accFillSz", default)]
    acc_fill_sz: Decimal,
}

fn venue_status_to_local(state: &str) -> OrderStatus {
    match state.to_lowercase().as_str() {
        "filled" => OrderStatus::Filled,
        "live" | "new" | "partially_filled" => OrderStatus::Open,
        "canceled" | "cancelled" => OrderStatus::Cancelled,
        "rejected" => OrderStatus::Rejected,
        _ => OrderStatus::Open,
    }
}

#[async_trait]
impl ExchangeAdapter for CoastalAdapter {
    fn id(&self) -> &'static str {
        "coastal"
    }

    fn canonicalise(&self, symbol: &Symbol) -> Symbol {
        self.translator.to_venue(symbol)
    }

    async fn get_markets(&self) -> Result<Vec<(Symbol, MarketInfo)>, ExecutionError> {
        let raw: Vec<RawInstrument> = self
            .request(
                reqwest::Method::GET,
                "/deepcoin/market/instruments",
                &[("instType", "SWAP".to_string())],
                None,
            )
            .await?;
        Ok(raw
            .into_iter()
            .map(|inst| {
                let info = MarketInfo {
                    base: Asset::new_from_exchange(inst.base_ccy),
                    quote: Asset::new_from_exchange(inst.quote_ccy),
                    price_tick: inst.tick_sz,
                    lot_size: inst.lot_sz,
                    min_notional: inst.min_sz.unwrap_or(Decimal::new(5, 0)),
                    price_precision: inst.tick_sz.scale(),
                    quantity_precision: inst.lot_sz.scale(),
                };
                (self.translator.to_canonical(&Symbol::new(inst.inst_id)), info)
            })
            .collect())
    }

    async fn get_ticker(&self, symbol: &Symbol) -> Result<Ticker, ExecutionError> {
        let venue_symbol = self.canonicalise(symbol);
        let raw: Vec<RawTicker> = self
            .request(
                reqwest::Method::GET,
                "/deepcoin/market/tickers",
                &[("instType", "SWAP".to_string()), ("instId", venue_symbol.to_string())],
                None,
            )
            .await?;
        let ticker = raw.into_iter().next().ok_or_else(|| ExecutionError::UnknownSymbol(symbol.to_string()))?;
        Ok(Ticker {
            symbol: symbol.clone(),
            last_price: ticker.last,
            high_price: ticker.high_24h,
            low_price: ticker.low_24h,
            volume: ticker.vol_24h,
            time_exchange: Utc::now(),
        })
    }

    async fn get_depth(&self, symbol: &Symbol, limit: u32) -> Result<Depth, ExecutionError> {
        let venue_symbol = self.canonicalise(symbol);
        let raw: RawBook = self
            .request(
                reqwest::Method::GET,
                "/deepcoin/market/books",
                &[("instId", venue_symbol.to_string()), ("sz", limit.min(400).to_string())],
                None,
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
        _start_ms: Option<i64>,
        _end_ms: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Kline>, ExecutionError> {
        let venue_symbol = self.canonicalise(symbol);
        let bar = match interval {
            "1h" => "1H",
            "4h" => "4H",
            "1d" => "1D",
            "1w" => "1W",
            other => other,
        };
        let raw: Vec<RawCandle> = self
            .request(
                reqwest::Method::GET,
                "/deepcoin/market/candles",
                &[("instId", venue_symbol.to_string()), ("bar", bar.to_string()), ("limit", limit.min(300).to_string())],
                None,
            )
            .await?;

        // The venue returns newest-to-oldest; callers expect oldest-to-newest (spec §4.A).
        Ok(raw
            .into_iter()
            .rev()
            .map(|c| Kline { open_time_ms: c.0, open: c.1, high: c.2, low: c.3, close: c.4, volume: c.5 })
            .collect())
    }

    async fn get_server_time(&self) -> Result<i64, ExecutionError> {
        Ok(Utc::now().timestamp_millis())
    }

    async fn get_balance(&self) -> Result<Vec<AssetBalance<Asset>>, ExecutionError> {
        let raw: Vec<RawBalance> = self
            .request(
                reqwest::Method::GET,
                "/deepcoin/account/balances",
                &[("instType", "SWAP".to_string())],
                None,
            )
            .await?;
        let now = Utc::now();
        Ok(raw
            .into_iter()
            .map(|b| AssetBalance {
                asset: Asset::new_from_exchange(b.ccy),
                balance: Balance { total: b.avail_bal + b.frozen_bal, free: b.avail_bal },
                time_exchange: now,
            })
            .collect())
    }

    async fn get_positions(&self, symbol: Option<&Symbol>) -> Result<Vec<Position>, ExecutionError> {
        let mut query = vec![("instType", "SWAP".to_string())];
        if let Some(symbol) = symbol {
            query.push(("instId", self.canonicalise(symbol).to_string()));
        }
        let raw: Vec<RawPosition> = self
            .request(reqwest::Method::GET, "/deepcoin/account/positions", &query, None)
            .await?;
        let now = Utc::now();
        Ok(raw
            .into_iter()
            .filter(|p| !p.pos.is_zero())
            .map(|p| Position {
                symbol: self.translator.to_canonical(&Symbol::new(p.inst_id)),
                side: if p.pos_side.eq_ignore_ascii_case("long") { PositionSide::Long } else { PositionSide::Short },
                quantity: p.pos.abs(),
                entry_price: p.avg_px,
                mark_price: p.mark_px,
                unrealized_pnl: p.upl,
                realized_pnl: p.realized_pnl,
                created_at: now,
                updated_at: now,
            })
            .collect())
    }

    async fn execute_order(&self, mut request: OrderRequestOpen) -> Result<Order, ExecutionError> {
        request.symbol = self.translator.to_canonical(&request.symbol);
        let venue_symbol = self.canonicalise(&request.symbol);
        let symbol = request.symbol.clone();
        self.apply_precision(&symbol, &mut request).await?;

        let pos_side = if request.reduce_only {
            if request.side == OrderSide::Sell { "long" } else { "short" }
        } else if request.side == OrderSide::Buy {
            "long"
        } else {
            "short"
        };

        let mut body = json!({
            "instId": venue_symbol.to_string(),
            "tdMode": "cross",
            "side": request.side.to_string(),
            "ordType": if request.kind == OrderKind::Market { "market" } else { "limit" },
            "sz": request.quantity.to_string(),
            "posSide": pos_side,
            "reduceOnly": request.reduce_only,
        });
        if let Some(price) = request.price {
            body["px"] = json!(price.to_string());
        }

        let raw: RawOrder = self.request(reqwest::Method::POST, "/deepcoin/trade/order", &[], Some(&body)).await?;

        let id = self.order_ids.lock().next(Utc::now());
        let mut order = Order::new_open(id, VenueOrderId::new(raw.ord_id), request, Utc::now());
        order.status = venue_status_to_local(&raw.state);
        order.filled_quantity = raw.acc_fill_sz;
        Ok(order)
    }

    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> Result<Vec<Order>, ExecutionError> {
        let mut query = vec![("limit", "100".to_string())];
        if let Some(symbol) = symbol {
            query.push(("instId", self.canonicalise(symbol).to_string()));
        }
        let raw: Vec<RawOrder> = self
            .request(reqwest::Method::GET, "/deepcoin/trade/orders-pending", &query, None)
            .await?;
        Ok(raw.into_iter().map(|o| raw_order_to_snapshot(o, &self.translator, &self.order_ids)).collect())
    }

    async fn get_order(&self, id: &VenueOrderId, symbol: &Symbol) -> Result<Order, ExecutionError> {
        let query = vec![("instId", self.canonicalise(symbol).to_string()), ("ordId", id.0.clone())];
        let raw: RawOrder = self.request(reqwest::Method::GET, "/deepcoin/trade/order", &query, None).await?;
        Ok(raw_order_to_snapshot(raw, &self.translator, &self.order_ids))
    }

    async fn cancel_order(&self, symbol: &Symbol, id: &VenueOrderId) -> Result<(), ExecutionError> {
        let body = json!({ "instId": self.canonicalise(symbol).to_string(), "ordId": id.0 });
        let _: Value = self
            .request(reqwest::Method::POST, "/deepcoin/trade/cancel-order", &[], Some(&body))
            .await?;
        Ok(())
    }

    async fn cancel_all_orders(&self, symbol: Option<&Symbol>) -> Result<(), ExecutionError> {
        // No native cancel-all: fan out over the open order list, same as the reference client.
        for order in self.get_open_orders(symbol).await? {
            if let Some(venue_id) = &order.venue_id {
                self.cancel_order(&order.symbol, venue_id).await?;
            }
        }
        Ok(())
    }
}

fn raw_order_to_snapshot(raw: RawOrder, translator: &CoastalTranslator, order_ids: &Mutex<OrderIdGenerator>) -> Order {
    let id = order_ids.lock().next(Utc::now());
    let now = Utc::now();
    Order {
        id,
        venue_id: Some(VenueOrderId::new(raw.ord_id)),
        symbol: translator.to_canonical(&Symbol::new(raw.inst_id)),
        side: if raw.side.eq_ignore_ascii_case("buy") { OrderSide::Buy } else { OrderSide::Sell },
        kind: if raw.ord_type.eq_ignore_ascii_case("market") { OrderKind::Market } else { OrderKind::Limit },
        quantity: raw.sz,
        price: raw.px,
        reduce_only: false,
        post_only: false,
        status: venue_status_to_local(&raw.state),
        filled_quantity: raw.acc_fill_sz,
        commission: Decimal::ZERO,
        originating_signal: None,
        created_at: now,
        updated_at: now,
        filled_at: None,
        not_found_strikes: 0,
    }
}
