//! Run statistics shared by every concurrent unit of a run
//!
//! Counters only ever grow and are updated with atomic increments. Each
//! increment is mirrored to a `metrics` counter for the Prometheus exporter.

use crate::config::Mode;
use metrics::counter;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub const OPERATIONS_COMPLETED: &str = "mcp_loadgen_operations_completed_total";
pub const OPERATIONS_FAILED: &str = "mcp_loadgen_operations_failed_total";
pub const SESSIONS_CREATED: &str = "mcp_loadgen_sessions_created_total";
pub const BATCHES_COMPLETED: &str = "mcp_loadgen_batches_completed_total";
pub const CONNECT_RETRIES: &str = "mcp_loadgen_connect_retries_total";

#[derive(Debug, Default)]
pub struct RunStats {
    operations_completed: AtomicU64,
    operations_failed: AtomicU64,
    batches_completed: AtomicU64,
    clients_created: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one successful operation, returning the new total
    pub fn record_success(&self) -> u64 {
        counter!(OPERATIONS_COMPLETED).increment(1);
        self.operations_completed.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Count one failed operation, returning the new total
    pub fn record_failure(&self) -> u64 {
        counter!(OPERATIONS_FAILED).increment(1);
        self.operations_failed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_outcomes(&self, succeeded: u64, failed: u64) {
        counter!(OPERATIONS_COMPLETED).increment(succeeded);
        counter!(OPERATIONS_FAILED).increment(failed);
        self.operations_completed
            .fetch_add(succeeded, Ordering::Relaxed);
        self.operations_failed.fetch_add(failed, Ordering::Relaxed);
    }

    /// Count one finished churn batch, returning the new total
    pub fn record_batch(&self) -> u64 {
        counter!(BATCHES_COMPLETED).increment(1);
        self.batches_completed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_clients_created(&self, count: u64) -> u64 {
        self.clients_created.fetch_add(count, Ordering::Relaxed) + count
    }

    pub fn operations_completed(&self) -> u64 {
        self.operations_completed.load(Ordering::Relaxed)
    }

    pub fn operations_failed(&self) -> u64 {
        self.operations_failed.load(Ordering::Relaxed)
    }

    pub fn batches_completed(&self) -> u64 {
        self.batches_completed.load(Ordering::Relaxed)
    }

    pub fn clients_created(&self) -> u64 {
        self.clients_created.load(Ordering::Relaxed)
    }

    /// Freeze the counters into a snapshot for progress logs and the summary
    pub fn snapshot(&self, mode: Mode, elapsed: Duration) -> StatsSnapshot {
        StatsSnapshot {
            mode,
            operations_completed: self.operations_completed(),
            operations_failed: self.operations_failed(),
            batches_completed: self.batches_completed(),
            clients_created: self.clients_created(),
            elapsed,
        }
    }
}

/// Point-in-time copy of the run counters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub mode: Mode,
    pub operations_completed: u64,
    pub operations_failed: u64,
    pub batches_completed: u64,
    pub clients_created: u64,
    pub elapsed: Duration,
}

impl StatsSnapshot {
    fn per_second(&self, count: u64) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { count as f64 / secs } else { 0.0 }
    }

    pub fn ops_per_sec(&self) -> f64 {
        self.per_second(self.operations_completed)
    }

    pub fn clients_per_sec(&self) -> f64 {
        self.per_second(self.clients_created)
    }
}

/// Summary block printed on graceful shutdown
impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Benchmark Summary ({} mode):", self.mode)?;
        if self.mode == Mode::Swarm {
            writeln!(f, "- Total batches completed: {}", self.batches_completed)?;
            writeln!(f, "- Total clients created: {}", self.clients_created)?;
        }
        writeln!(
            f,
            "- Total operations completed: {}",
            self.operations_completed
        )?;
        writeln!(f, "- Total operations failed: {}", self.operations_failed)?;
        if self.mode == Mode::Swarm {
            writeln!(
                f,
                "- Average client creation rate: {:.2} clients/sec",
                self.clients_per_sec()
            )?;
        }
        writeln!(f, "- Average throughput: {:.2} ops/sec", self.ops_per_sec())?;
        write!(
            f,
            "- Total runtime: {:.2} seconds",
            self.elapsed.as_secs_f64()
        )
    }
}
