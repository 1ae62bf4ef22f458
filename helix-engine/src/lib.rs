#![warn(unused, clippy::cognitive_complexity, clippy::useless_let_if_seq, clippy::suspicious_operation_groupings, unused_lifetimes, unused_qualifications)]
//! The Live Trading Engine (spec §4.D, §4.E): order/position/balance state and the five
//! background loops that drive a single exchange adapter end to end.

pub mod config;
pub mod error;
pub mod live;

pub use config::EngineConfig;
pub use error::EngineError;
pub use live::LiveTradingEngine;
