//! Churn-load scheduler (swarm mode)
//!
//! Each iteration creates a full batch of sessions, issues exactly one
//! operation per session, closes all of them, and waits before the next
//! iteration. No session survives an iteration.

use crate::batch::{BatchError, close_all, create_batch, invoke_all};
use crate::config::Mode;
use crate::session::{Connector, SessionError, SessionFactory};
use crate::shutdown::Shutdown;
use crate::stats::{RunStats, StatsSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};

/// Log cumulative progress every this many completed batches
pub const PROGRESS_EVERY_BATCHES: u64 = 5;

#[derive(Debug, Clone, Copy)]
pub struct ChurnOptions {
    /// Sessions created (and operated once) per iteration
    pub batch_size: usize,
    /// Pause between iterations
    pub interval: Duration,
    pub operation_timeout: Duration,
    /// Stop after this many completed batches
    pub max_batches: Option<u64>,
}

#[derive(Debug)]
enum Iteration {
    Completed,
    /// Shutdown interrupted the iteration; its sessions were still closed
    Interrupted,
    CreationFailed(SessionError),
}

pub struct ChurnScheduler<'a, C> {
    factory: &'a SessionFactory<C>,
    options: ChurnOptions,
    stats: Arc<RunStats>,
    shutdown: Shutdown,
}

impl<'a, C: Connector> ChurnScheduler<'a, C> {
    pub fn new(
        factory: &'a SessionFactory<C>,
        options: ChurnOptions,
        stats: Arc<RunStats>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            factory,
            options,
            stats,
            shutdown,
        }
    }

    /// Run iterations until shutdown (or the batch limit) and return the
    /// final counters
    pub async fn run(&self) -> StatsSnapshot {
        let started = Instant::now();
        info!(
            "Swarm mode: each batch will create {} clients, perform one operation per client, then close them.",
            self.options.batch_size
        );
        info!(
            "Swarm mode: new batches will be created every {:?}.",
            self.options.interval
        );

        while !self.shutdown.is_triggered() {
            let batch_number = self.stats.batches_completed() + 1;
            match self.run_iteration(batch_number).await {
                Iteration::Completed => {
                    let completed = self.stats.record_batch();
                    if completed % PROGRESS_EVERY_BATCHES == 0 {
                        self.log_progress(started);
                    }
                    if let Some(max) = self.options.max_batches
                        && completed >= max
                    {
                        info!("Reached batch limit of {}, stopping swarm mode", max);
                        self.shutdown.trigger();
                        break;
                    }
                }
                Iteration::Interrupted => break,
                Iteration::CreationFailed(e) => {
                    error!("Error in swarm batch #{}: {}", batch_number, e);
                }
            }

            if !self.shutdown.sleep(self.options.interval).await {
                break;
            }
        }

        info!("Stopping swarm mode...");
        self.stats.snapshot(Mode::Swarm, started.elapsed())
    }

    async fn run_iteration(&self, batch_number: u64) -> Iteration {
        let size = self.options.batch_size;
        info!("Creating batch #{} with {} clients...", batch_number, size);

        let sessions = match create_batch(self.factory, size, size).await {
            Ok(sessions) => sessions,
            Err(BatchError { created, source }) => {
                self.stats.record_clients_created(created.len() as u64);
                close_all(created).await;
                return match source {
                    SessionError::Cancelled => Iteration::Interrupted,
                    source => Iteration::CreationFailed(source),
                };
            }
        };
        self.stats.record_clients_created(sessions.len() as u64);

        info!(
            "Batch #{}: Listing tools with {} clients...",
            batch_number,
            sessions.len()
        );
        let outcome = invoke_all(&sessions, self.options.operation_timeout, &self.shutdown).await;
        self.stats.record_outcomes(outcome.succeeded, outcome.failed);

        info!("Batch #{}: Closing {} clients...", batch_number, sessions.len());
        close_all(sessions).await;

        if outcome.cancelled > 0 {
            Iteration::Interrupted
        } else {
            Iteration::Completed
        }
    }

    fn log_progress(&self, started: Instant) {
        let snapshot = self.stats.snapshot(Mode::Swarm, started.elapsed());
        info!(
            "Swarm Progress:\n- Batches completed: {}\n- Clients created: {}\n- Operations completed: {} ({:.2} ops/sec)\n- Operations failed: {}\n- Runtime: {:.2} seconds",
            snapshot.batches_completed,
            snapshot.clients_created,
            snapshot.operations_completed,
            snapshot.ops_per_sec(),
            snapshot.operations_failed,
            snapshot.elapsed.as_secs_f64()
        );
    }
}
