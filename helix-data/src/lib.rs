#![warn(
    unused,
    clippy::cognitive_complexity,
    clippy::useless_let_if_seq,
    clippy::suspicious_operation_groupings,
    unused_lifetimes,
    unused_qualifications
)]

//! Market-data fan-in: a single reconnecting kline WebSocket client per live-trading engine
//! instance (spec §4.B).

/// Concrete [`kline::KlineProtocol`] for the EdDSA-signed venue's `kline.<interval>.<SYMBOL>`
/// subscribe/frame shape.
pub mod edge;

/// [`error::DataError`] transport/decode failure taxonomy.
pub mod error;

/// [`kline::KlineStream`], the reconnecting kline WebSocket client, and the
/// [`kline::KlineProtocol`] trait each venue implements for its own subscribe/decode shape.
pub mod kline;
