use helix_execution::error::ExecutionError;
use thiserror::Error;

/// Failures surfaced by the strategy contract and the grid engine (spec §6.1, §4.F).
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("exchange adapter call failed: {0}")]
    Adapter(#[from] ExecutionError),

    /// A grid instance's own boundary protection tripped (daily or total loss limit) and the
    /// instance stopped itself; not a bug, just a terminal outcome for the caller to observe.
    #[error("grid instance stopped itself: {0}")]
    SelfStopped(String),

    #[error("invalid grid configuration: {0}")]
    InvalidConfig(String),
}
