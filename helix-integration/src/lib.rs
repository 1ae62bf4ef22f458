#![warn(
    unused,
    clippy::cognitive_complexity,
    clippy::useless_let_if_seq,
    clippy::suspicious_operation_groupings,
    clippy::mutex_integer,
    clippy::needless_collect,
    clippy::suboptimal_flops,
    unused_lifetimes,
    unused_qualifications
)]

//! Low-level framework for composing flexible web integrations, with financial exchanges in
//! mind: transport-agnostic channels, a priority-aware rate limiter, a reconnect-friendly Http
//! REST client and a small collection toolkit shared by every adapter crate in this workspace.

/// `Tx`/`Rx` channel abstractions used to forward exchange data out of a task.
pub mod channel;

/// Cardinality-polymorphic collections (`OneOrMany`, `NoneOneOrMany`) and `Fnv`-hashed maps.
pub mod collection;

/// Shared transport error type and the [`error::Unrecoverable`] marker trait.
pub mod error;

/// Metric value objects for optional operational telemetry export.
pub mod metric;

/// Http and WebSocket protocol building blocks (REST client, request signing strategy).
pub mod protocol;

/// Priority-aware token-bucket rate limiter with adaptive backoff.
pub mod rate_limit;

/// Wraps a value to make explicit whether it represents a full snapshot or an incremental update.
pub mod snapshot;

pub use error::Unrecoverable;
