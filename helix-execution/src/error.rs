use helix_integration::error::{SocketError, Unrecoverable};
use thiserror::Error;

/// Adapter failure taxonomy (spec §4.A Failure model, §7 Error taxonomy).
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Transport or decode error. Retried transparently up to 3x with exponential backoff by
    /// the caller; surfaces only on exhaustion.
    #[error("exchange unreachable: {0}")]
    ExchangeUnreachable(#[from] SocketError),

    /// Venue 429. Handled locally with a backoff/freeze window; never propagated further
    /// than the call site that hit it.
    #[error("rate limited")]
    RateLimited,

    /// Venue returned an order-execution response whose inner status field is `error`.
    #[error("order rejected: {0}")]
    OrderRejected(String),

    /// Venue 4xx "order not found" - recovered by the status poller's triple-strike rule,
    /// not a hard failure on its own.
    #[error("order not found: {0}")]
    NotFound(String),

    /// An exchange's symbol/precision cache does not (yet) know this symbol.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
}

impl Unrecoverable for ExecutionError {
    fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            ExecutionError::OrderRejected(_) | ExecutionError::UnknownSymbol(_)
        )
    }
}
