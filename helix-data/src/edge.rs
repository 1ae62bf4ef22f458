use crate::{
    error::DataError,
    kline::{Kline, KlineProtocol, KlineUpdate},
};
use helix_instrument::symbol::Symbol;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message;

/// `kline.<interval>.<SYMBOL>` subscribe-key protocol, grounded on the reference venue's
/// `subscribe`/`_handle_kline_message` pair: a `{"id","method":"SUBSCRIBE","params":[key]}`
/// envelope per symbol, and inbound frames shaped `{"stream": key, "data": {t,o,h,l,c,v,x}}`.
pub struct EdgeKlineProtocol;

#[derive(Debug, Deserialize)]
struct SubscriptionFrame {
    stream: String,
    data: KlineFrame,
}

#[derive(Debug, Deserialize)]
struct KlineFrame {
    t: i64,
    o: Decimal,
    h: Decimal,
    l: Decimal,
    c: Decimal,
    v: Decimal,
    #[serde(default)]
    x: bool,
}

fn subscribe_key(symbol: &Symbol, interval: &str) -> String {
    format!("kline.{interval}.{symbol}")
}

/// Recovers the canonical symbol from a `kline.<interval>.<SYMBOL>` stream name.
fn symbol_from_stream(stream: &str) -> Option<Symbol> {
    let mut parts = stream.splitn(3, '.');
    let channel = parts.next()?;
    let _interval = parts.next()?;
    let symbol = parts.next()?;
    (channel == "kline").then(|| Symbol::new(symbol))
}

impl KlineProtocol for EdgeKlineProtocol {
    fn subscribe_messages(&self, symbols: &[Symbol], interval: &str) -> Vec<Message> {
        symbols
            .iter()
            .map(|symbol| {
                let payload = serde_json::json!({
                    "id": uuid_like_id(),
                    "method": "SUBSCRIBE",
                    "params": [subscribe_key(symbol, interval)],
                });
                Message::Text(payload.to_string().into())
            })
            .collect()
    }

    fn decode(&self, text: &str) -> Option<Result<KlineUpdate, DataError>> {
        if !text.contains("\"stream\"") || !text.contains("kline") {
            return None;
        }

        Some(
            serde_json::from_str::<SubscriptionFrame>(text)
                .map_err(DataError::from)
                .and_then(|frame| {
                    symbol_from_stream(&frame.stream)
                        .map(|symbol| KlineUpdate {
                            symbol,
                            kline: Kline {
                                open_time_ms: frame.data.t,
                                open: frame.data.o,
                                high: frame.data.h,
                                low: frame.data.l,
                                close: frame.data.c,
                                volume: frame.data.v,
                                is_closed: frame.data.x,
                            },
                        })
                        .ok_or_else(|| DataError::UnrecognisedStream(frame.stream.clone()))
                }),
        )
    }
}

/// Cheap request-id generator; the venue echoes but never validates it.
fn uuid_like_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or_default();
    format!("{nanos:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_key_matches_venue_format() {
        assert_eq!(subscribe_key(&Symbol::new("ETH_USDC_PERP"), "15m"), "kline.15m.ETH_USDC_PERP");
    }

    #[test]
    fn symbol_from_stream_round_trips() {
        assert_eq!(symbol_from_stream("kline.15m.ETH_USDC_PERP"), Some(Symbol::new("ETH_USDC_PERP")));
        assert_eq!(symbol_from_stream("ticker.ETH_USDC_PERP"), None);
    }

    #[test]
    fn decode_parses_kline_frame() {
        let protocol = EdgeKlineProtocol;
        let text = r#"{"stream":"kline.15m.ETH_USDC_PERP","data":{"t":1000,"o":"1.0","h":"1.1","l":"0.9","c":"1.05","v":"10","x":true}}"#;
        let update = protocol.decode(text).unwrap().unwrap();
        assert_eq!(update.symbol, Symbol::new("ETH_USDC_PERP"));
        assert!(update.kline.is_closed);
    }

    #[test]
    fn decode_ignores_non_kline_frames() {
        let protocol = EdgeKlineProtocol;
        assert!(protocol.decode(r#"{"result":null,"id":"abc"}"#).is_none());
    }
}
