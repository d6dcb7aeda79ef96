//! JSON-RPC 2.0 messages for the MCP handshake and `tools/list`

use super::error::TransportError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const PROTOCOL_VERSION: &str = "2025-03-26";
pub const CLIENT_NAME: &str = "benchmark-client";
pub const CLIENT_VERSION: &str = "1.0.0";

const JSONRPC_VERSION: &str = "2.0";

/// Outgoing request
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: u64, method: &'static str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }

    pub fn initialize(id: u64) -> Self {
        Self::new(
            id,
            "initialize",
            Some(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": CLIENT_NAME,
                    "version": CLIENT_VERSION,
                },
            })),
        )
    }

    pub fn list_tools(id: u64) -> Self {
        Self::new(id, "tools/list", None)
    }
}

/// Outgoing notification (no id, no response)
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    jsonrpc: &'static str,
    pub method: &'static str,
}

impl Notification {
    pub fn initialized() -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: "notifications/initialized",
        }
    }
}

/// Error object carried by a failed response
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// Any incoming message. Server requests and notifications carry `method`;
/// responses carry `result` or `error`.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl Message {
    pub fn parse(text: &str) -> Result<Self, TransportError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn is_response(&self) -> bool {
        self.method.is_none() && (self.result.is_some() || self.error.is_some())
    }

    /// Id of a response to one of our (numeric) requests
    pub fn response_id(&self) -> Option<u64> {
        if !self.is_response() {
            return None;
        }
        match self.id.as_ref()? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<Value, TransportError> {
        if let Some(error) = self.error {
            return Err(TransportError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        self.result
            .ok_or_else(|| TransportError::Protocol("response has neither result nor error".into()))
    }
}
