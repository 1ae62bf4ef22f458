use helix_integration::error::Unrecoverable;
use thiserror::Error;

/// Kline stream failure taxonomy (spec §4.B).
#[derive(Debug, Error)]
pub enum DataError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode kline frame: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("stream name did not match the kline pattern for any registered symbol: {0}")]
    UnrecognisedStream(String),
}

impl Unrecoverable for DataError {
    fn is_unrecoverable(&self) -> bool {
        matches!(self, DataError::UnrecognisedStream(_))
    }
}
