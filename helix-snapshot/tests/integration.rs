use chrono::Utc;
use helix_execution::{
    order::{OrderId, OrderKind, OrderRequestOpen, OrderSide, VenueOrderId},
    position::{Position, PositionSide},
};
use helix_instrument::symbol::Symbol;
use helix_snapshot::{
    record::{PortfolioSnapshot, TradeRecord},
    sink::{FileSink, PersistenceSink},
};
use rust_decimal_macros::dec;

fn root(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("helix-snapshot-integration-{name}-{}", std::process::id()))
}

#[tokio::test]
async fn persists_and_reloads_open_orders_across_sink_instances() {
    let path = root("orders");
    let order = helix_execution::order::Order::new_open(
        OrderId::new(0, 0),
        VenueOrderId::new("v1".to_string()),
        OrderRequestOpen::new(Symbol::new("ETH_USDC_PERP"), OrderSide::Buy, OrderKind::Limit, dec!(1), Some(dec!(2000)), false, false, None),
        Utc::now(),
    );

    {
        let sink = FileSink::new(&path);
        sink.save_order(&order).await.unwrap();
    }

    // A fresh sink over the same root should recover open orders from the append log.
    let reopened = FileSink::new(&path);
    let loaded = reopened.load_open_orders().await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id, order.id);
}

#[tokio::test]
async fn terminal_orders_are_excluded_from_open_orders() {
    let path = root("terminal");
    let mut order = helix_execution::order::Order::new_open(
        OrderId::new(0, 0),
        VenueOrderId::new("v1".to_string()),
        OrderRequestOpen::new(Symbol::new("ETH_USDC_PERP"), OrderSide::Buy, OrderKind::Limit, dec!(1), Some(dec!(2000)), false, false, None),
        Utc::now(),
    );

    let sink = FileSink::new(&path);
    sink.save_order(&order).await.unwrap();
    order.status = helix_execution::order::OrderStatus::Filled;
    sink.save_order(&order).await.unwrap();

    assert!(sink.load_open_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn trade_and_portfolio_snapshot_writes_succeed() {
    let path = root("trades");
    let sink = FileSink::new(&path);

    let trade = TradeRecord::new(
        "t1".to_string(),
        OrderId::new(0, 0),
        Some(VenueOrderId::new("v1".to_string())),
        Symbol::new("ETH_USDC_PERP"),
        OrderSide::Buy,
        dec!(1),
        dec!(2000),
        dec!(0.5),
        "USDC".to_string(),
        false,
        Utc::now(),
    );
    sink.save_trade(&trade).await.unwrap();

    let snapshot = PortfolioSnapshot::new(Utc::now(), dec!(10000), dec!(2000), dec!(12000), dec!(50), dec!(0.005));
    sink.save_portfolio_snapshot(&snapshot).await.unwrap();

    let manifest_path = path.join("manifest.json");
    let manifest: Vec<String> = serde_json::from_str(&std::fs::read_to_string(manifest_path).unwrap()).unwrap();
    assert!(manifest.contains(&"trades".to_string()));
    assert!(manifest.contains(&"portfolio".to_string()));
}

#[tokio::test]
async fn positions_persist_and_reload() {
    let path = root("positions");
    let position = Position::new(Symbol::new("SOL_USDC_PERP"), PositionSide::Short, dec!(10), dec!(20), Utc::now());

    {
        let sink = FileSink::new(&path);
        sink.save_position(&position).await.unwrap();
    }

    let reopened = FileSink::new(&path);
    let loaded = reopened.load_positions().await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].symbol, position.symbol);
}
