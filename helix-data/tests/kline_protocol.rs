use helix_data::edge::EdgeKlineProtocol;
use helix_data::kline::KlineProtocol;
use helix_instrument::symbol::Symbol;

#[test]
fn subscribe_messages_cover_every_registered_symbol() {
    let protocol = EdgeKlineProtocol;
    let symbols = vec![Symbol::new("ETH_USDC_PERP"), Symbol::new("BTC_USDC_PERP"), Symbol::new("SOL_USDC_PERP")];
    let messages = protocol.subscribe_messages(&symbols, "15m");
    assert_eq!(messages.len(), 3);
}

#[test]
fn decode_recovers_canonical_symbol_from_stream_name() {
    let protocol = EdgeKlineProtocol;
    let text = r#"{"stream":"kline.15m.SOL_USDC_PERP","data":{"t":1700000000000,"o":"20.1","h":"20.5","l":"19.9","c":"20.3","v":"1000","x":false}}"#;
    let update = protocol.decode(text).unwrap().unwrap();
    assert_eq!(update.symbol, Symbol::new("SOL_USDC_PERP"));
    assert!(!update.kline.is_closed);
}
