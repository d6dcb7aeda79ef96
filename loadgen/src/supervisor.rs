//! Run supervisor
//!
//! Picks the scheduler for the configured mode, wires the interrupt signal
//! into the shared shutdown token, and logs the final summary.

use crate::batch::close_all;
use crate::config::{Config, Mode, TransportKind};
use crate::scheduler::{
    ChurnOptions, ChurnScheduler, SustainedOptions, SustainedScheduler, build_pool,
};
use crate::session::{Connector, SessionError, SessionFactory};
use crate::shutdown::Shutdown;
use crate::stats::{RunStats, StatsSnapshot};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to build the client pool: {0}")]
    PoolConstruction(#[source] SessionError),
}

/// Log the effective configuration once at startup
pub fn log_banner(config: &Config) {
    let mut banner = format!(
        "Starting benchmark with the following configuration:\n\
         - Target URL: {}\n\
         - SSE Enabled: {}\n\
         - Mode: {}\n\
         - Number of Clients: {}\n\
         - Clients Creation Batch Size: {}\n\
         - Operations Per Minute: {}\n\
         - Max Retries: {}\n\
         - Initial Backoff: {}ms\n\
         - Max Backoff: {}ms\n\
         - Backoff Factor: {}",
        config.target,
        config.transport == TransportKind::Sse,
        config.mode,
        config.clients,
        config.creation_batch_size,
        config.ops_rate,
        config.retry.max_retries,
        config.retry.initial_backoff_ms,
        config.retry.max_backoff_ms,
        config.retry.backoff_factor,
    );
    if config.mode == Mode::Swarm {
        banner.push_str(&format!(
            "\n- Swarm Interval: {}ms",
            config.swarm_interval.as_millis()
        ));
    }
    if let Some(duration) = config.duration {
        banner.push_str(&format!("\n- Run Duration: {:?}", duration));
    }
    info!("{}", banner);
}

/// Flip the shutdown token on Ctrl-C. The handler does nothing else; the
/// active scheduler performs its own cleanup.
pub fn install_interrupt_handler(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for interrupt signal: {}", e);
                return;
            }
            if shutdown.trigger() {
                info!("Received abort. Shutting down...");
            } else {
                warn!("Shutdown already in progress, ignoring repeated interrupt");
            }
        }
    })
}

/// Drive one run to completion and return the final counters.
///
/// Returns `Ok` on a graceful stop, including a stop requested while the
/// normal-mode pool was still being built. Fails only when the pool cannot
/// be built because session creation exhausted its retries.
pub async fn run<C: Connector>(
    config: &Config,
    connector: C,
    shutdown: Shutdown,
) -> Result<StatsSnapshot, SupervisorError> {
    let stats = Arc::new(RunStats::new());
    let factory = SessionFactory::new(connector, config.retry.clone(), shutdown.clone())
        .with_connect_timeout(config.operation_timeout);
    if let Some(duration) = config.duration {
        shutdown.trigger_after(duration);
    }

    let snapshot = match config.mode {
        Mode::Normal => run_normal(config, &factory, stats, shutdown).await?,
        Mode::Swarm => {
            let options = ChurnOptions {
                batch_size: config.clients,
                interval: config.swarm_interval,
                operation_timeout: config.operation_timeout,
                max_batches: config.max_batches,
            };
            ChurnScheduler::new(&factory, options, stats, shutdown)
                .run()
                .await
        }
    };

    info!("\n{}", snapshot);
    Ok(snapshot)
}

async fn run_normal<C: Connector>(
    config: &Config,
    factory: &SessionFactory<C>,
    stats: Arc<RunStats>,
    shutdown: Shutdown,
) -> Result<StatsSnapshot, SupervisorError> {
    let started = Instant::now();
    let pool = match build_pool(factory, &stats, config.clients, config.creation_batch_size).await
    {
        Ok(pool) => pool,
        Err(err) => {
            info!("Closing {} partially created clients...", err.created.len());
            close_all(err.created).await;
            return match err.source {
                SessionError::Cancelled => {
                    info!("Received abort during pool creation.");
                    Ok(stats.snapshot(Mode::Normal, started.elapsed()))
                }
                source => Err(SupervisorError::PoolConstruction(source)),
            };
        }
    };

    let options = SustainedOptions {
        period: config.tick_period(),
        operation_timeout: config.operation_timeout,
        overlap: config.tick_overlap,
    };
    let report = SustainedScheduler::new(pool, options, stats, shutdown)
        .run()
        .await;
    Ok(report.snapshot)
}
