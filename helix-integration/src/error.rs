use thiserror::Error;

/// Transport/protocol level errors shared by every Http and WebSocket integration in this
/// workspace. Adapter-specific error enums (see `helix-execution::error::ExecutionError`) wrap
/// this type rather than duplicating it.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("Sink error")]
    Sink,

    #[error("{entity} exchange subscription/s failed: {error}")]
    Subscribe { entity: String, error: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP request build failed: {0}")]
    HttpBuilder(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("error deserialising response: {error}, payload: {}", String::from_utf8_lossy(payload))]
    DeserialiseBinary {
        error: serde_json::Error,
        payload: Vec<u8>,
    },

    #[error("error serialising request: {0}")]
    Serialise(#[from] serde_json::Error),

    #[error("error serialising url-encoded request: {0}")]
    SerialiseQuery(#[from] serde_urlencoded::ser::Error),

    #[error("expected WebSocket CloseFrame but received something else")]
    ExpectedCloseFrame,
}

/// Allows an error type to distinguish between a recoverable failure (worth retrying) and an
/// unrecoverable one (the caller should stop and surface it).
pub trait Unrecoverable {
    fn is_unrecoverable(&self) -> bool;
}
