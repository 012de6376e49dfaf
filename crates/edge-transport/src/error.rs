//! Transport error types.

use thiserror::Error;

/// Socket-level failures.
#[derive(Error, Debug)]
pub enum TransportError {
    /// WebSocket protocol or handshake error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Malformed URL or header in the open request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Proxy tunnel could not be established
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using TransportError.
pub type TransportResult<T> = Result<T, TransportError>;
