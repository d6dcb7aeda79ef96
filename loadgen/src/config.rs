//! Harness configuration
//!
//! Configuration is loaded from environment variables and then overridden by
//! command-line flags in `main`.

use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Unknown mode: {0} (expected 'normal' or 'swarm')")]
    UnknownMode(String),

    #[error("Unknown tick overlap policy: {0} (expected 'allow' or 'skip')")]
    UnknownTickOverlap(String),

    #[error("Target MCP server URL is required")]
    MissingTarget,

    #[error("Invalid target URL {url}: {reason}")]
    InvalidTarget { url: String, reason: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("Operations rate must be positive (got {0})")]
    InvalidOpsRate(f64),

    #[error("Operations rate {0} per minute gives a tick period outside 1ms to 7 days")]
    TickPeriodOutOfRange(f64),

    #[error("Backoff factor must be at least 1 (got {0})")]
    InvalidBackoffFactor(f64),

    #[error("Initial backoff ({initial_ms}ms) exceeds max backoff ({max_ms}ms)")]
    BackoffRange { initial_ms: u64, max_ms: u64 },
}

/// Load shape driven against the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Mode {
    /// Long-lived pool, each session ticking at a fixed rate
    #[default]
    Normal,
    /// Create a batch, one operation per session, close, repeat
    Swarm,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Normal => "normal",
            Mode::Swarm => "swarm",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Ok(Mode::Normal),
            "swarm" => Ok(Mode::Swarm),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

/// Wire variant used to reach the MCP server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// Streamable HTTP: every message is a POST to the target URL
    #[default]
    StreamableHttp,
    /// Legacy HTTP+SSE: long-lived event stream plus a POST endpoint
    Sse,
}

impl TransportKind {
    pub fn from_sse_flag(sse: bool) -> Self {
        if sse {
            TransportKind::Sse
        } else {
            TransportKind::StreamableHttp
        }
    }
}

/// What a sustained-mode session does when a tick fires while its previous
/// operation is still outstanding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TickOverlap {
    /// Issue the operation anyway; operations on one session may overlap
    #[default]
    Allow,
    /// Drop the tick
    Skip,
}

impl FromStr for TickOverlap {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "allow" => Ok(TickOverlap::Allow),
            "skip" => Ok(TickOverlap::Skip),
            _ => Err(ConfigError::UnknownTickOverlap(s.to_string())),
        }
    }
}

/// Shortest interval between operations on one sustained-mode session
pub const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);
/// Longest interval between operations on one sustained-mode session
pub const MAX_TICK_PERIOD: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Bound a tick period to what the session timers accept
pub fn clamp_tick_period(period: Duration) -> Duration {
    period.clamp(MIN_TICK_PERIOD, MAX_TICK_PERIOD)
}

/// Retry parameters for session establishment
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt; total attempts are `max_retries + 1`
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            backoff_factor: 2.0,
        }
    }
}

/// Main harness configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Target MCP server URL
    pub target: String,
    /// Wire variant
    pub transport: TransportKind,
    /// Bearer credential attached to every request
    pub token: Option<String>,
    /// Normal mode: pool size. Swarm mode: sessions per batch.
    pub clients: usize,
    /// Normal mode: sessions created concurrently per ramp-up batch
    pub creation_batch_size: usize,
    /// Normal mode: operations per minute per session
    pub ops_rate: f64,
    /// Session establishment retries
    pub retry: RetryConfig,
    pub mode: Mode,
    /// Swarm mode: pause between batches
    pub swarm_interval: Duration,
    /// Timeout applied to every `tools/list` call
    pub operation_timeout: Duration,
    /// Normal mode: behaviour when a tick finds the previous call in flight
    pub tick_overlap: TickOverlap,
    /// Stop gracefully after this long
    pub duration: Option<Duration>,
    /// Swarm mode: stop gracefully after this many completed batches
    pub max_batches: Option<u64>,
    /// Address for the Prometheus scrape listener
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: String::new(),
            transport: TransportKind::default(),
            token: None,
            clients: 10,
            creation_batch_size: 5,
            ops_rate: 60.0,
            retry: RetryConfig::default(),
            mode: Mode::default(),
            swarm_interval: Duration::from_millis(5000),
            operation_timeout: Duration::from_secs(60),
            tick_overlap: TickOverlap::default(),
            duration: None,
            max_batches: None,
            metrics_addr: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unparsable numeric values are ignored and the default is kept. An
    /// unknown mode or overlap policy is an error, since picking a default
    /// silently would run the wrong load shape.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(target) = env::var("MCP_TARGET")
            && !target.is_empty()
        {
            config.target = target;
        }
        if let Ok(val) = env::var("MCP_SSE") {
            config.transport =
                TransportKind::from_sse_flag(val.to_lowercase() == "true" || val == "1");
        }
        if let Ok(token) = env::var("MCP_TOKEN").or_else(|_| env::var("APIFY_TOKEN"))
            && !token.is_empty()
        {
            config.token = Some(token);
        }

        if let Ok(val) = env::var("MCP_CLIENTS")
            && let Ok(v) = val.parse()
        {
            config.clients = v;
        }
        if let Ok(val) = env::var("MCP_CLIENTS_BATCH_SIZE")
            && let Ok(v) = val.parse()
        {
            config.creation_batch_size = v;
        }
        if let Ok(val) = env::var("MCP_OPS_RATE")
            && let Ok(v) = val.parse()
        {
            config.ops_rate = v;
        }

        // Retry config
        if let Ok(val) = env::var("MCP_MAX_RETRIES")
            && let Ok(v) = val.parse()
        {
            config.retry.max_retries = v;
        }
        if let Ok(val) = env::var("MCP_INITIAL_BACKOFF_MS")
            && let Ok(v) = val.parse()
        {
            config.retry.initial_backoff_ms = v;
        }
        if let Ok(val) = env::var("MCP_MAX_BACKOFF_MS")
            && let Ok(v) = val.parse()
        {
            config.retry.max_backoff_ms = v;
        }
        if let Ok(val) = env::var("MCP_BACKOFF_FACTOR")
            && let Ok(v) = val.parse()
        {
            config.retry.backoff_factor = v;
        }

        if let Ok(val) = env::var("MCP_MODE") {
            config.mode = val.parse()?;
        }
        if let Ok(val) = env::var("MCP_SWARM_INTERVAL_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            config.swarm_interval = Duration::from_millis(ms);
        }
        if let Ok(val) = env::var("MCP_OPERATION_TIMEOUT_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            config.operation_timeout = Duration::from_millis(ms);
        }
        if let Ok(val) = env::var("MCP_TICK_OVERLAP") {
            config.tick_overlap = val.parse()?;
        }

        Ok(config)
    }

    /// Reject configurations that cannot drive a run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.is_empty() {
            return Err(ConfigError::MissingTarget);
        }
        reqwest::Url::parse(&self.target).map_err(|e| ConfigError::InvalidTarget {
            url: self.target.clone(),
            reason: e.to_string(),
        })?;
        if self.clients == 0 {
            return Err(ConfigError::Zero("clients"));
        }
        if self.creation_batch_size == 0 {
            return Err(ConfigError::Zero("clients creation batch size"));
        }
        if !(self.ops_rate.is_finite() && self.ops_rate > 0.0) {
            return Err(ConfigError::InvalidOpsRate(self.ops_rate));
        }
        match Duration::try_from_secs_f64(60.0 / self.ops_rate) {
            Ok(period) if (MIN_TICK_PERIOD..=MAX_TICK_PERIOD).contains(&period) => {}
            _ => return Err(ConfigError::TickPeriodOutOfRange(self.ops_rate)),
        }
        if self.retry.backoff_factor.is_nan() || self.retry.backoff_factor < 1.0 {
            return Err(ConfigError::InvalidBackoffFactor(self.retry.backoff_factor));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::BackoffRange {
                initial_ms: self.retry.initial_backoff_ms,
                max_ms: self.retry.max_backoff_ms,
            });
        }
        Ok(())
    }

    /// Interval between operations on one sustained-mode session, bounded
    /// to `MIN_TICK_PERIOD..=MAX_TICK_PERIOD`
    pub fn tick_period(&self) -> Duration {
        clamp_tick_period(
            Duration::try_from_secs_f64(60.0 / self.ops_rate).unwrap_or(MAX_TICK_PERIOD),
        )
    }
}
