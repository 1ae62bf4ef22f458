#![warn(
    unused,
    clippy::cognitive_complexity,
    clippy::useless_let_if_seq,
    clippy::suspicious_operation_groupings,
    unused_lifetimes,
    unused_qualifications
)]

//! Stream private account data from financial venues, and execute (live) orders.
//!
//! This crate defines the [`adapter::ExchangeAdapter`] capability contract (spec §4.A) and
//! three concrete implementations, one per signing regime: [`client::edge::EdgeSigner`]
//! (EdDSA-over-sorted-params), [`client::coastal::CoastalSigner`]
//! (HMAC-SHA256-with-passphrase) and [`client::onchain::OnchainSigner`] (EIP-712 typed data
//! over an action+nonce envelope).

pub mod adapter;
pub mod balance;
pub mod client;
pub mod error;
pub mod order;
pub mod position;
pub mod precision;
pub mod signal;
