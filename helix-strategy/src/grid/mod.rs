//! Grid Strategy Engine (spec §4.F): a ladder of resting limit orders around a price range,
//! each filled rung immediately paired with a reduce-only close one rung over.

pub mod instance;
pub mod levels;

pub use instance::{GridInstance, GridInstanceConfig, GridStats};
pub use levels::{GridLevel, GridLevelStatus, GridMode};
