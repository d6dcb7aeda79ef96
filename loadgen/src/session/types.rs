//! Session error definitions

use crate::transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Terminal session-creation failure
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to create session after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("Session creation cancelled by shutdown")]
    Cancelled,
}

/// A failed `tools/list` call
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
