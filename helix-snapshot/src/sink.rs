use crate::record::{PortfolioSnapshot, TradeRecord};
use async_trait::async_trait;
use helix_execution::{order::Order, position::Position};
use helix_risk::event::RiskEvent;
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    collections::HashMap,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("persistence I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to serialise record: {0}")]
    Serialise(#[from] serde_json::Error),
}

/// Persistence contract the live trading engine calls into (spec §6.3). Every call is
/// fire-and-forget from the engine's point of view: a failed save is logged by the caller,
/// never propagated into the trading loop.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn save_order(&self, order: &Order) -> Result<(), SnapshotError>;
    async fn save_trade(&self, trade: &TradeRecord) -> Result<(), SnapshotError>;
    async fn save_position(&self, position: &Position) -> Result<(), SnapshotError>;
    async fn save_portfolio_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<(), SnapshotError>;
    async fn save_risk_event(&self, event: &RiskEvent) -> Result<(), SnapshotError>;
    async fn load_open_orders(&self) -> Result<Vec<Order>, SnapshotError>;
    async fn load_positions(&self) -> Result<Vec<Position>, SnapshotError>;
}

/// Appends `record` as one JSON line to `path`, mirroring the original `write_parquet` append
/// step but newline-delimited JSON rather than a columnar format, since no parquet crate is
/// part of the corpus's dependency stack.
fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    serde_json::to_writer(&mut file, record)?;
    file.write_all(b"\n")?;
    Ok(())
}

fn read_jsonl<T: for<'de> serde::Deserialize<'de>>(path: &Path) -> Result<Vec<T>, SnapshotError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path)?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(SnapshotError::from))
        .collect()
}

/// File-backed [`PersistenceSink`]: an in-memory latest-state cache (orders/positions, so
/// `load_open_orders`/`load_positions` don't need a disk scan) fronting append-only JSON-lines
/// logs per record kind, each registered into a manifest file listing every log written -
/// the same cache-then-flush-then-register pipeline shape as the original redis/parquet/s3/
/// iceberg scheduler, generalised from opaque key/value pairs to the engine's own record types.
pub struct FileSink {
    root: PathBuf,
    open_orders: Mutex<HashMap<helix_execution::order::OrderId, Order>>,
    positions: Mutex<HashMap<helix_instrument::symbol::Symbol, Position>>,
    manifest: Mutex<Vec<String>>,
}

impl FileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            open_orders: Mutex::new(HashMap::new()),
            positions: Mutex::new(HashMap::new()),
            manifest: Mutex::new(Vec::new()),
        }
    }

    fn log_path(&self, kind: &str) -> PathBuf {
        self.root.join(format!("{kind}.jsonl"))
    }

    fn register(&self, kind: &str) {
        self.manifest.lock().push(kind.to_string());
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    /// Flushes the in-memory manifest to disk; called after every append so a crash mid-run
    /// still leaves a readable record of which logs exist.
    fn flush_manifest(&self) -> Result<(), SnapshotError> {
        let manifest = self.manifest.lock();
        if let Some(parent) = self.manifest_path().parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(self.manifest_path())?;
        serde_json::to_writer(file, &*manifest)?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceSink for FileSink {
    async fn save_order(&self, order: &Order) -> Result<(), SnapshotError> {
        self.open_orders.lock().insert(order.id, order.clone());
        if order.is_terminal() {
            self.open_orders.lock().remove(&order.id);
        }
        append_jsonl(&self.log_path("orders"), order)?;
        self.register("orders");
        self.flush_manifest()
    }

    async fn save_trade(&self, trade: &TradeRecord) -> Result<(), SnapshotError> {
        append_jsonl(&self.log_path("trades"), trade)?;
        self.register("trades");
        self.flush_manifest()
    }

    async fn save_position(&self, position: &Position) -> Result<(), SnapshotError> {
        self.positions.lock().insert(position.symbol.clone(), position.clone());
        append_jsonl(&self.log_path("positions"), position)?;
        self.register("positions");
        self.flush_manifest()
    }

    async fn save_portfolio_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<(), SnapshotError> {
        append_jsonl(&self.log_path("portfolio"), snapshot)?;
        self.register("portfolio");
        self.flush_manifest()
    }

    async fn save_risk_event(&self, event: &RiskEvent) -> Result<(), SnapshotError> {
        append_jsonl(&self.log_path("risk_events"), event)?;
        self.register("risk_events");
        self.flush_manifest()
    }

    async fn load_open_orders(&self) -> Result<Vec<Order>, SnapshotError> {
        if self.open_orders.lock().is_empty() {
            let loaded: Vec<Order> = read_jsonl(&self.log_path("orders"))?
                .into_iter()
                .filter(|order: &Order| !order.is_terminal())
                .collect();
            let mut cache = self.open_orders.lock();
            for order in &loaded {
                cache.insert(order.id, order.clone());
            }
        }
        Ok(self.open_orders.lock().values().cloned().collect())
    }

    async fn load_positions(&self) -> Result<Vec<Position>, SnapshotError> {
        if self.positions.lock().is_empty() {
            let loaded: Vec<Position> = read_jsonl(&self.log_path("positions"))?;
            let mut cache = self.positions.lock();
            for position in &loaded {
                cache.insert(position.symbol.clone(), position.clone());
            }
        }
        Ok(self.positions.lock().values().cloned().collect())
    }
}

/// Calls `sink.$method` and logs (rather than propagates) any failure, implementing the
/// fire-and-forget discipline the engine's call sites use.
#[macro_export]
macro_rules! fire_and_forget {
    ($future:expr, $what:literal) => {
        if let Err(error) = $future.await {
            tracing::warn!(%error, what = $what, "persistence call failed");
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use helix_execution::{
        order::{OrderKind, OrderRequestOpen, OrderSide},
        position::PositionSide,
    };
    use helix_instrument::symbol::Symbol;
    use rust_decimal_macros::dec;

    fn tmp_root() -> PathBuf {
        std::env::temp_dir().join(format!("helix-snapshot-test-{}", std::process::id()))
    }

    #[tokio::test]
    async fn save_and_reload_open_orders_round_trips() {
        let sink = FileSink::new(tmp_root());
        let order = Order::new_open(
            helix_execution::order::OrderId::new(0, 0),
            helix_execution::order::VenueOrderId::new("v1".to_string()),
            OrderRequestOpen::new(Symbol::new("ETH_USDC_PERP"), OrderSide::Buy, OrderKind::Limit, dec!(1), Some(dec!(2000)), false, false, None),
            Utc::now(),
        );
        sink.save_order(&order).await.unwrap();
        let loaded = sink.load_open_orders().await.unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn save_and_reload_positions_round_trips() {
        let sink = FileSink::new(tmp_root());
        let position = Position::new(Symbol::new("ETH_USDC_PERP"), PositionSide::Long, dec!(1), dec!(2000), Utc::now());
        sink.save_position(&position).await.unwrap();
        let loaded = sink.load_positions().await.unwrap();
        assert_eq!(loaded.len(), 1);
    }
}
