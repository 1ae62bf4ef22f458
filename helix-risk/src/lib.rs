#![warn(
    unused,
    clippy::cognitive_complexity,
    clippy::useless_let_if_seq,
    clippy::suspicious_operation_groupings,
    unused_lifetimes,
    unused_qualifications
)]

//! Pre-trade risk gate and portfolio risk analytics: margin/drawdown limits, VaR estimation,
//! scenario-based stress testing and a bounded risk event journal (spec §4.C).

/// Pre-trade check configuration ([`config::TradingConfig`]).
pub mod config;

/// Bounded risk event journal ([`event::RiskEventJournal`]).
pub mod event;

/// The main pre-trade gate and portfolio bookkeeping entry point ([`manager::RiskManager`]).
pub mod manager;

/// Risk report generation ([`report::generate_risk_report`]).
pub mod report;

/// Scenario-based stress testing ([`stress::run_stress_test`]).
pub mod stress;

/// VaR estimators: historical, parametric and Monte-Carlo ([`var`]).
pub mod var;
