#![warn(unused, clippy::cognitive_complexity, clippy::useless_let_if_seq, clippy::suspicious_operation_groupings, unused_lifetimes, unused_qualifications)]
//! Strategy contract (spec §6.1) and the Grid Strategy Engine (spec §4.F).

pub mod contract;
pub mod error;
pub mod grid;

pub use contract::{KlineSeries, Strategy};
pub use error::StrategyError;
