#![warn(unused, clippy::cognitive_complexity, clippy::useless_let_if_seq, clippy::suspicious_operation_groupings, unused_lifetimes, unused_qualifications)]
//! Persistence sink contract and a file-backed implementation (spec §6.3): orders, trades,
//! positions, portfolio snapshots and risk events, all fire-and-forget from the engine's
//! point of view.
pub mod record;
pub mod sink;
