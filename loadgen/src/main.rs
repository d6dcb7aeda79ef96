//! MCP load generator CLI
//!
//! Configuration comes from `MCP_*` environment variables; any flag given on
//! the command line overrides the environment.

use anyhow::{Context, Result};
use clap::Parser;
use mcp_loadgen::config::{Config, Mode, TickOverlap, TransportKind};
use mcp_loadgen::supervisor::{self, install_interrupt_handler, log_banner};
use mcp_loadgen::{McpConnector, Shutdown};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "mcp-loadgen")]
#[command(about = "Generate sustained or churn load against an MCP server", long_about = None)]
struct Cli {
    /// Target MCP server URL
    #[arg(short, long)]
    target: Option<String>,

    /// Use the legacy HTTP+SSE transport instead of streamable HTTP
    #[arg(long)]
    sse: bool,

    /// Pool size (normal mode) or sessions per batch (swarm mode)
    #[arg(short, long)]
    clients: Option<usize>,

    /// Sessions created concurrently while building the pool
    #[arg(long)]
    clients_creation_batch_size: Option<usize>,

    /// Operations per minute per session (normal mode)
    #[arg(short = 'r', long)]
    ops_rate: Option<f64>,

    /// Retries after a failed session creation attempt
    #[arg(long)]
    max_retries: Option<u32>,

    #[arg(long)]
    initial_backoff_ms: Option<u64>,

    #[arg(long)]
    max_backoff_ms: Option<u64>,

    #[arg(long)]
    backoff_factor: Option<f64>,

    /// Load shape
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Milliseconds between swarm batches
    #[arg(long)]
    swarm_interval: Option<u64>,

    /// Timeout for each tools/list call, in milliseconds
    #[arg(long)]
    operation_timeout_ms: Option<u64>,

    /// Tick handling while an operation is still in flight
    #[arg(long, value_enum)]
    tick_overlap: Option<TickOverlap>,

    /// Stop gracefully after this many seconds
    #[arg(long)]
    duration: Option<u64>,

    /// Stop swarm mode after this many completed batches
    #[arg(long)]
    max_batches: Option<u64>,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Overlay command-line flags onto the environment configuration
    fn apply(self, config: &mut Config) {
        if let Some(target) = self.target {
            config.target = target;
        }
        if self.sse {
            config.transport = TransportKind::Sse;
        }
        if let Some(v) = self.clients {
            config.clients = v;
        }
        if let Some(v) = self.clients_creation_batch_size {
            config.creation_batch_size = v;
        }
        if let Some(v) = self.ops_rate {
            config.ops_rate = v;
        }
        if let Some(v) = self.max_retries {
            config.retry.max_retries = v;
        }
        if let Some(v) = self.initial_backoff_ms {
            config.retry.initial_backoff_ms = v;
        }
        if let Some(v) = self.max_backoff_ms {
            config.retry.max_backoff_ms = v;
        }
        if let Some(v) = self.backoff_factor {
            config.retry.backoff_factor = v;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(ms) = self.swarm_interval {
            config.swarm_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.operation_timeout_ms {
            config.operation_timeout = Duration::from_millis(ms);
        }
        if let Some(policy) = self.tick_overlap {
            config.tick_overlap = policy;
        }
        if let Some(secs) = self.duration {
            config.duration = Some(Duration::from_secs(secs));
        }
        if let Some(max) = self.max_batches {
            config.max_batches = Some(max);
        }
        if let Some(addr) = self.metrics_addr {
            config.metrics_addr = Some(addr);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mcp_loadgen=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("Invalid environment configuration")?;
    cli.apply(&mut config);
    config.validate()?;

    if let Some(addr) = config.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to start Prometheus exporter")?;
        info!("Serving Prometheus metrics on {}", addr);
    }

    log_banner(&config);

    let connector = McpConnector::from_config(&config)?;
    let shutdown = Shutdown::new();
    install_interrupt_handler(shutdown.clone());

    supervisor::run(&config, connector, shutdown)
        .await
        .context("Benchmark aborted")?;
    Ok(())
}
