//! Session lifecycle
//!
//! This module provides:
//! - `Session` and `Connector` traits abstracting the wire transport
//! - `SessionFactory`, which establishes sessions with retry and backoff
//! - `invoke_operation`, the single timed `tools/list` call

mod factory;
mod types;

pub use factory::{DEFAULT_CONNECT_TIMEOUT, SessionFactory};
pub use types::{OperationError, SessionError};

use crate::transport::TransportError;
use async_trait::async_trait;
use std::time::Duration;

/// An established connection to the target.
///
/// `close` consumes the session, so a closed session can never be used
/// again and cannot be closed twice.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    /// List the server's tools; only success or failure is observed
    async fn list_tools(&self) -> Result<(), TransportError>;

    async fn close(self) -> Result<(), TransportError>;
}

/// Opens one session per call (transport construction plus handshake)
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Session: Session;

    async fn connect(&self) -> Result<Self::Session, TransportError>;
}

/// Issue one operation, failing with `OperationError::Timeout` after `timeout`
pub async fn invoke_operation<S: Session>(
    session: &S,
    timeout: Duration,
) -> Result<(), OperationError> {
    match tokio::time::timeout(timeout, session.list_tools()).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(OperationError::Timeout(timeout)),
    }
}
