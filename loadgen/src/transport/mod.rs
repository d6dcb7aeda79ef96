//! MCP client transports
//!
//! This module provides:
//! - `McpConnector`, the production `Connector` selecting a wire variant
//! - `StreamableSession` (streamable HTTP) and `SseSession` (HTTP+SSE)
//! - JSON-RPC message types and an incremental event-stream decoder

mod error;
mod event_stream;
pub mod jsonrpc;
mod sse;
mod streamable;

pub use error::TransportError;
pub use event_stream::{SseDecoder, SseEvent};
pub use sse::SseSession;
pub use streamable::{SESSION_ID_HEADER, StreamableSession};

use crate::config::{Config, TransportKind};
use crate::session::{Connector, Session};
use async_trait::async_trait;
use reqwest::Url;

/// Establishes MCP sessions against one target
#[derive(Debug, Clone)]
pub struct McpConnector {
    target: Url,
    kind: TransportKind,
    token: Option<String>,
}

impl McpConnector {
    pub fn new(
        target: &str,
        kind: TransportKind,
        token: Option<String>,
    ) -> Result<Self, TransportError> {
        let target =
            Url::parse(target).map_err(|e| TransportError::InvalidUrl(format!("{target}: {e}")))?;
        Ok(Self {
            target,
            kind,
            token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        Self::new(&config.target, config.transport, config.token.clone())
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }
}

/// An established session over either wire variant
pub enum McpSession {
    Streamable(StreamableSession),
    Sse(SseSession),
}

#[async_trait]
impl Session for McpSession {
    async fn list_tools(&self) -> Result<(), TransportError> {
        match self {
            McpSession::Streamable(s) => s.list_tools().await,
            McpSession::Sse(s) => s.list_tools().await,
        }
    }

    async fn close(self) -> Result<(), TransportError> {
        match self {
            McpSession::Streamable(s) => s.close().await,
            McpSession::Sse(s) => s.close().await,
        }
    }
}

#[async_trait]
impl Connector for McpConnector {
    type Session = McpSession;

    async fn connect(&self) -> Result<McpSession, TransportError> {
        match self.kind {
            TransportKind::StreamableHttp => Ok(McpSession::Streamable(
                StreamableSession::connect(self.target.clone(), self.token.clone()).await?,
            )),
            TransportKind::Sse => Ok(McpSession::Sse(
                SseSession::connect(self.target.clone(), self.token.clone()).await?,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_rejects_invalid_target() {
        let err = McpConnector::new("::nope::", TransportKind::Sse, None).unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl(_)));
    }

    #[test]
    fn test_connector_from_config() {
        let config = Config {
            target: "http://127.0.0.1:9/mcp".to_string(),
            transport: TransportKind::Sse,
            ..Config::default()
        };
        let connector = McpConnector::from_config(&config).unwrap();
        assert_eq!(connector.kind(), TransportKind::Sse);
    }
}
