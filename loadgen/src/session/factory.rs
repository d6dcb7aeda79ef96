//! Session establishment with retry and backoff

use super::types::SessionError;
use super::Connector;
use crate::backoff::RetryState;
use crate::config::RetryConfig;
use crate::shutdown::Shutdown;
use crate::stats::{CONNECT_RETRIES, SESSIONS_CREATED};
use crate::transport::TransportError;
use metrics::counter;
use std::time::Duration;
use tracing::{debug, warn};

/// Deadline for one connect attempt unless overridden
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Creates sessions through a `Connector`, retrying failed attempts.
///
/// Each attempt must finish within the connect timeout; a stalled handshake
/// counts as a failed attempt. Backoff sleeps and in-flight attempts are
/// interrupted by the shutdown token. A failed or interrupted attempt drops
/// whatever it had opened.
pub struct SessionFactory<C> {
    connector: C,
    retry: RetryConfig,
    shutdown: Shutdown,
    connect_timeout: Duration,
}

impl<C: Connector> SessionFactory<C> {
    pub fn new(connector: C, retry: RetryConfig, shutdown: Shutdown) -> Self {
        Self {
            connector,
            retry,
            shutdown,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Establish one session.
    ///
    /// Fails with `SessionError::Exhausted` after `max_retries + 1` failed
    /// attempts, or `SessionError::Cancelled` if shutdown is requested.
    pub async fn create(&self) -> Result<C::Session, SessionError> {
        let mut state = RetryState::new();

        loop {
            if self.shutdown.is_triggered() {
                return Err(SessionError::Cancelled);
            }

            let attempt = tokio::select! {
                biased;
                _ = self.shutdown.triggered() => return Err(SessionError::Cancelled),
                attempt = tokio::time::timeout(self.connect_timeout, self.connector.connect()) => {
                    attempt.unwrap_or_else(|_| Err(TransportError::Timeout(self.connect_timeout)))
                }
            };

            let err = match attempt {
                Ok(session) => {
                    counter!(SESSIONS_CREATED).increment(1);
                    debug!("Session created after {} retries", state.retries);
                    return Ok(session);
                }
                Err(err) => err,
            };

            // ThreadRng is not Send; keep it out of the await below
            let delay = state.on_failure(&self.retry, &mut rand::rng());
            let Some(delay) = delay else {
                warn!(
                    "Failed to create session after {} retries: {}",
                    self.retry.max_retries, err
                );
                return Err(SessionError::Exhausted {
                    attempts: state.retries,
                    source: err,
                });
            };

            counter!(CONNECT_RETRIES).increment(1);
            warn!(
                "Session creation failed, retrying in {}ms (attempt {}/{}): {}",
                delay.as_millis(),
                state.retries,
                self.retry.max_retries,
                err
            );
            if !self.shutdown.sleep(delay).await {
                return Err(SessionError::Cancelled);
            }
        }
    }
}
