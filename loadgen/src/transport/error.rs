use std::time::Duration;
use thiserror::Error;

/// Errors raised by the MCP transports
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Session closed")]
    Closed,

    #[error("Handshake timed out after {0:?}")]
    Timeout(Duration),
}
