//! Batch builder: concurrent session creation with bounded parallelism, plus
//! the best-effort operation and close steps applied to whole batches

use crate::session::{
    Connector, OperationError, Session, SessionError, SessionFactory, invoke_operation,
};
use crate::shutdown::Shutdown;
use futures_util::future::join_all;
use futures_util::{StreamExt, stream};
use std::fmt;
use std::time::Duration;
use tracing::{error, warn};

/// A fail-fast batch creation stopped on a terminal session error.
///
/// `created` holds the sessions established before the failure; the caller
/// owns them and must close them.
pub struct BatchError<S> {
    pub created: Vec<S>,
    pub source: SessionError,
}

impl<S> fmt::Debug for BatchError<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchError")
            .field("created", &self.created.len())
            .field("source", &self.source)
            .finish()
    }
}

impl<S> fmt::Display for BatchError<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch creation failed after {} sessions: {}",
            self.created.len(),
            self.source
        )
    }
}

impl<S> std::error::Error for BatchError<S> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Split `total` sessions into creation batches of at most `width`,
/// with a final partial batch for the remainder
pub fn plan_batches(total: usize, width: usize) -> Vec<usize> {
    let width = width.max(1);
    let mut plan = vec![width; total / width];
    if total % width != 0 {
        plan.push(total % width);
    }
    plan
}

/// Create `size` sessions with at most `width` creations in flight.
///
/// Fail-fast: the first terminal error drops the creations still in flight
/// and returns the sessions already established inside the error.
pub async fn create_batch<C: Connector>(
    factory: &SessionFactory<C>,
    size: usize,
    width: usize,
) -> Result<Vec<C::Session>, BatchError<C::Session>> {
    let mut created = Vec::with_capacity(size);
    let mut in_flight = stream::iter(0..size)
        .map(|_| factory.create())
        .buffer_unordered(width.max(1));

    while let Some(result) = in_flight.next().await {
        match result {
            Ok(session) => created.push(session),
            Err(source) => return Err(BatchError { created, source }),
        }
    }
    Ok(created)
}

/// Per-session results of one best-effort operation step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub succeeded: u64,
    pub failed: u64,
    /// Operations abandoned because shutdown was requested
    pub cancelled: u64,
}

/// Issue one operation on every session concurrently. Each result is
/// classified independently; a failure never aborts its siblings.
pub async fn invoke_all<S: Session>(
    sessions: &[S],
    timeout: Duration,
    shutdown: &Shutdown,
) -> BatchOutcome {
    let results = join_all(sessions.iter().map(|session| async move {
        tokio::select! {
            biased;
            _ = shutdown.triggered() => None,
            result = invoke_operation(session, timeout) => Some(result),
        }
    }))
    .await;

    let mut outcome = BatchOutcome::default();
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Some(Ok(())) => outcome.succeeded += 1,
            Some(Err(e)) => {
                outcome.failed += 1;
                log_operation_error(index, &e);
            }
            None => outcome.cancelled += 1,
        }
    }
    outcome
}

pub(crate) fn log_operation_error(index: usize, err: &OperationError) {
    error!("Error listing tools for client {}: {}", index, err);
}

/// Result of closing a group of sessions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseReport {
    pub closed: usize,
    pub failed: usize,
}

impl CloseReport {
    pub fn all_closed(&self) -> bool {
        self.failed == 0
    }
}

/// Close every session concurrently. A failure to close one session is
/// logged and never prevents closing the others.
pub async fn close_all<S: Session>(sessions: Vec<S>) -> CloseReport {
    let results = join_all(sessions.into_iter().map(|session| session.close())).await;

    let mut report = CloseReport::default();
    for result in results {
        match result {
            Ok(()) => report.closed += 1,
            Err(e) => {
                report.failed += 1;
                warn!("Error closing client: {}", e);
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::test_utils::MockConnector;
    use std::collections::HashSet;

    fn factory(connector: &MockConnector, max_retries: u32) -> SessionFactory<MockConnector> {
        SessionFactory::new(
            connector.clone(),
            RetryConfig {
                max_retries,
                initial_backoff_ms: 10,
                max_backoff_ms: 100,
                backoff_factor: 2.0,
            },
            Shutdown::new(),
        )
    }

    #[test]
    fn test_plan_batches() {
        assert_eq!(plan_batches(12, 5), vec![5, 5, 2]);
        assert_eq!(plan_batches(10, 5), vec![5, 5]);
        assert_eq!(plan_batches(3, 5), vec![3]);
        assert_eq!(plan_batches(0, 5), Vec::<usize>::new());
        assert_eq!(plan_batches(2, 0), vec![1, 1]);
    }

    #[tokio::test]
    async fn test_create_batch_produces_distinct_sessions() {
        let connector = MockConnector::new();
        let sessions = create_batch(&factory(&connector, 0), 8, 3).await.unwrap();

        assert_eq!(sessions.len(), 8);
        let ids: HashSet<u64> = sessions.iter().map(|s| s.id()).collect();
        assert_eq!(ids.len(), 8);
        assert_eq!(connector.attempts(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_batch_bounds_parallelism() {
        let connector = MockConnector::new().with_connect_delay(Duration::from_millis(100));
        let start = tokio::time::Instant::now();
        let sessions = create_batch(&factory(&connector, 0), 6, 2).await.unwrap();

        assert_eq!(sessions.len(), 6);
        // three waves of two concurrent creations
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_batch_fails_fast_and_returns_created() {
        // Attempt 2 fails and there are no retries
        let connector = MockConnector::new()
            .failing_attempts(&[2])
            .with_connect_delay(Duration::from_millis(10));
        let err = create_batch(&factory(&connector, 0), 6, 2)
            .await
            .unwrap_err();

        assert!(matches!(err.source, SessionError::Exhausted { .. }));
        // attempts 0 and 1 completed in the first wave
        let ids: Vec<u64> = err.created.iter().map(|s| s.id()).collect();
        assert!(ids.contains(&0) && ids.contains(&1));
        assert!(connector.attempts() < 6);

        let report = close_all(err.created).await;
        assert!(report.all_closed());
    }

    #[tokio::test]
    async fn test_invoke_all_classifies_independently() {
        let connector = MockConnector::new().failing_operations_every(3);
        let sessions = create_batch(&factory(&connector, 0), 3, 3).await.unwrap();

        let outcome = invoke_all(&sessions, Duration::from_secs(60), &Shutdown::new()).await;
        assert_eq!(
            outcome,
            BatchOutcome {
                succeeded: 2,
                failed: 1,
                cancelled: 0
            }
        );
        assert_eq!(connector.operations(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_all_times_out_slow_operations() {
        let connector = MockConnector::new().with_operation_delay(Duration::from_secs(120));
        let sessions = create_batch(&factory(&connector, 0), 2, 2).await.unwrap();

        let outcome = invoke_all(&sessions, Duration::from_secs(60), &Shutdown::new()).await;
        assert_eq!(outcome.failed, 2);
        assert_eq!(outcome.succeeded, 0);
    }

    #[tokio::test]
    async fn test_invoke_all_after_shutdown_counts_nothing() {
        let connector = MockConnector::new();
        let sessions = create_batch(&factory(&connector, 0), 2, 2).await.unwrap();
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let outcome = invoke_all(&sessions, Duration::from_secs(60), &shutdown).await;
        assert_eq!(outcome.cancelled, 2);
        assert_eq!(outcome.succeeded + outcome.failed, 0);
    }

    #[tokio::test]
    async fn test_close_all_continues_past_failures() {
        let connector = MockConnector::new().failing_close();
        let sessions = create_batch(&factory(&connector, 0), 4, 4).await.unwrap();

        let report = close_all(sessions).await;
        assert_eq!(report, CloseReport { closed: 0, failed: 4 });
        assert_eq!(connector.closed().len(), 4);
    }
}
