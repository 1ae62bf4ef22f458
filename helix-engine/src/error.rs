use helix_execution::error::ExecutionError;
use helix_integration::error::Unrecoverable;
use thiserror::Error;

/// Engine-level failure taxonomy (spec §7), layered over [`ExecutionError`]. Every background
/// loop catches at its own boundary and decides locally whether a failure is worth logging and
/// continuing past or worth tearing the engine down for.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Adapter call failed. Most loop bodies log this and retry on the next tick; only `stop()`
    /// lets it propagate.
    #[error("adapter call failed: {0}")]
    Adapter(#[from] ExecutionError),

    /// The pre-trade risk gate vetoed an order before it ever reached the adapter.
    #[error("risk manager rejected order: {0}")]
    RiskViolation(String),

    /// A background task's stop flag was observed; not a failure, a clean unwind signal.
    #[error("engine task cancelled")]
    Cancelled,

    /// Unrecoverable per [`Unrecoverable::is_unrecoverable`] or a broken internal invariant;
    /// re-raised by `stop()` after every task has been joined.
    #[error("fatal engine error: {0}")]
    Fatal(String),
}

impl EngineError {
    /// Classifies an [`ExecutionError`] the way every loop boundary in this crate does: an
    /// unrecoverable adapter error escalates to [`EngineError::Fatal`], everything else is
    /// logged and retried by the caller.
    pub fn from_adapter(error: ExecutionError) -> Self {
        if error.is_unrecoverable() {
            EngineError::Fatal(error.to_string())
        } else {
            EngineError::Adapter(error)
        }
    }
}
