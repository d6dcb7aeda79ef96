//! MCP load generator library
//!
//! Drives many concurrent MCP client sessions against one server, either as
//! a sustained pool issuing `tools/list` at a fixed rate (normal mode) or as
//! repeated create / operate once / close batches (swarm mode).
//!
//! The binary in `main.rs` wires configuration, logging and the interrupt
//! handler around [`supervisor::run`]; integration tests drive the same
//! entry point against an in-process mock server.

pub mod backoff;
pub mod batch;
pub mod config;
pub mod scheduler;
pub mod session;
pub mod shutdown;
pub mod stats;
pub mod supervisor;
pub mod transport;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types
pub use config::{Config, Mode, RetryConfig, TickOverlap, TransportKind};
pub use session::{Connector, Session, SessionError, SessionFactory};
pub use shutdown::Shutdown;
pub use stats::{RunStats, StatsSnapshot};
pub use transport::{McpConnector, McpSession, TransportError};
