//! Sustained-load scheduler (normal mode)
//!
//! A long-lived pool where each session is driven by its own fixed-interval
//! timer issuing one `tools/list` per tick. Failing sessions stay in
//! rotation. On shutdown every timer stops, in-flight operations are
//! abandoned uncounted, the counters are frozen, and only then are the
//! sessions closed.

use crate::batch::{
    BatchError, CloseReport, close_all, create_batch, log_operation_error, plan_batches,
};
use crate::config::{Mode, TickOverlap, clamp_tick_period};
use crate::session::{Connector, Session, SessionFactory, invoke_operation};
use crate::shutdown::Shutdown;
use crate::stats::{RunStats, StatsSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Log progress every this many completed operations
pub const PROGRESS_EVERY_OPS: u64 = 100;

#[derive(Debug, Clone, Copy)]
pub struct SustainedOptions {
    /// Interval between operations on one session
    pub period: Duration,
    pub operation_timeout: Duration,
    pub overlap: TickOverlap,
}

/// Outcome of a sustained run
#[derive(Debug, Clone, Copy)]
pub struct SustainedReport {
    /// Counters frozen after the last timer stopped, before closing
    pub snapshot: StatsSnapshot,
    pub close: CloseReport,
}

/// Build the pool in creation batches of at most `width` sessions.
///
/// On failure every session created so far (across earlier batches too) is
/// returned inside the error for the caller to close.
pub async fn build_pool<C: Connector>(
    factory: &SessionFactory<C>,
    stats: &RunStats,
    total: usize,
    width: usize,
) -> Result<Vec<C::Session>, BatchError<C::Session>> {
    let plan = plan_batches(total, width);
    let batches = plan.len();
    let mut pool = Vec::with_capacity(total);

    for (index, size) in plan.into_iter().enumerate() {
        match create_batch(factory, size, size).await {
            Ok(batch) => {
                stats.record_clients_created(batch.len() as u64);
                pool.extend(batch);
                info!(
                    "Created client batch {} of {} ({} clients)",
                    index + 1,
                    batches,
                    size
                );
            }
            Err(BatchError { created, source }) => {
                stats.record_clients_created(created.len() as u64);
                pool.extend(created);
                return Err(BatchError {
                    created: pool,
                    source,
                });
            }
        }
    }
    Ok(pool)
}

pub struct SustainedScheduler<S> {
    sessions: Vec<S>,
    options: SustainedOptions,
    stats: Arc<RunStats>,
    shutdown: Shutdown,
}

impl<S: Session> SustainedScheduler<S> {
    pub fn new(
        sessions: Vec<S>,
        options: SustainedOptions,
        stats: Arc<RunStats>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            sessions,
            options,
            stats,
            shutdown,
        }
    }

    /// Drive the pool until shutdown, then close every session
    pub async fn run(self) -> SustainedReport {
        let started = Instant::now();
        info!(
            "Successfully created {} clients. Starting benchmark operations (one every {:?} per client)...",
            self.sessions.len(),
            self.options.period
        );

        // The pool keeps its own handle to every session, so a driver that
        // dies cannot take a session out of the close step
        let pool: Vec<Arc<S>> = self.sessions.into_iter().map(Arc::new).collect();
        let mut drivers = JoinSet::new();
        for (index, session) in pool.iter().enumerate() {
            drivers.spawn(drive_session(
                index,
                session.clone(),
                self.options,
                self.stats.clone(),
                self.shutdown.clone(),
                started,
            ));
        }

        // Drivers return only after their timer stopped and their in-flight
        // operations were abandoned
        while let Some(joined) = drivers.join_next().await {
            if let Err(e) = joined {
                error!("Session driver task failed: {}", e);
            }
        }

        let snapshot = self.stats.snapshot(Mode::Normal, started.elapsed());
        let sessions: Vec<S> = pool
            .into_iter()
            .enumerate()
            .filter_map(|(index, session)| match Arc::try_unwrap(session) {
                Ok(session) => Some(session),
                Err(_) => {
                    warn!("Client {} still referenced at shutdown, dropping without close", index);
                    None
                }
            })
            .collect();
        info!("Received abort. Closing {} clients...", sessions.len());

        let close = close_all(sessions).await;
        if close.all_closed() {
            info!("All clients closed.");
        } else {
            warn!(
                "Error closing clients: {} of {} failed to close",
                close.failed,
                close.failed + close.closed
            );
        }
        SustainedReport { snapshot, close }
    }
}

/// Tick loop for one session. Returns once shutdown was requested and every
/// operation it issued has been abandoned.
async fn drive_session<S: Session>(
    index: usize,
    session: Arc<S>,
    options: SustainedOptions,
    stats: Arc<RunStats>,
    shutdown: Shutdown,
    started: Instant,
) {
    let period = clamp_tick_period(options.period);
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.triggered() => break,
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            _ = ticker.tick() => {
                if options.overlap == TickOverlap::Skip && !in_flight.is_empty() {
                    debug!("Client {} still busy, skipping tick", index);
                    continue;
                }
                in_flight.spawn(tick_operation(
                    index,
                    session.clone(),
                    options.operation_timeout,
                    stats.clone(),
                    started,
                ));
            }
        }
    }

    in_flight.shutdown().await;
}

async fn tick_operation<S: Session>(
    index: usize,
    session: Arc<S>,
    timeout: Duration,
    stats: Arc<RunStats>,
    started: Instant,
) {
    match invoke_operation(session.as_ref(), timeout).await {
        Ok(()) => {
            let completed = stats.record_success();
            if completed % PROGRESS_EVERY_OPS == 0 {
                let snapshot = stats.snapshot(Mode::Normal, started.elapsed());
                info!(
                    "Completed {} operations ({:.2} ops/sec), failed: {}",
                    completed,
                    snapshot.ops_per_sec(),
                    snapshot.operations_failed
                );
            }
        }
        Err(e) => {
            stats.record_failure();
            log_operation_error(index, &e);
        }
    }
}
