//! Common Test Utilities for Integration Tests
//!
//! An in-process mock MCP server speaking both streamable HTTP (`/mcp`) and
//! the legacy HTTP+SSE transport (`/sse` plus `/messages`).

#![allow(dead_code)]

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
    routing::{get, post},
};
use futures_util::{Stream, StreamExt, stream};
use mcp_loadgen::transport::SESSION_ID_HEADER;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub const TEST_TOKEN: &str = "test-token";

/// Behaviour switches for the mock server
#[derive(Debug, Clone, Copy, Default)]
pub struct MockOptions {
    /// Answer streamable HTTP requests with an event-stream body
    pub event_stream_replies: bool,
    /// Answer every `tools/list` with a JSON-RPC error
    pub fail_tools_list: bool,
    /// Answer session termination with 405
    pub delete_not_allowed: bool,
    /// Accept connections but never finish the handshake: `initialize`
    /// never answers and the SSE stream never names its endpoint
    pub stall_handshake: bool,
}

#[derive(Default)]
pub struct MockServer {
    options: MockOptions,
    next_session: AtomicU64,
    pub initializations: AtomicU64,
    pub list_calls: AtomicU64,
    pub deletes: AtomicU64,
    sse_sessions: Mutex<HashMap<String, mpsc::UnboundedSender<String>>>,
}

impl MockServer {
    pub fn initializations(&self) -> u64 {
        self.initializations.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::SeqCst)
    }

    fn new_session_id(&self) -> String {
        format!("session-{}", self.next_session.fetch_add(1, Ordering::SeqCst))
    }

    /// Response to a JSON-RPC request, or `None` for notifications
    fn respond_to(&self, request: &Value) -> Option<Value> {
        let id = request.get("id")?.clone();
        let method = request.get("method").and_then(Value::as_str)?;

        let result = match method {
            "initialize" => {
                self.initializations.fetch_add(1, Ordering::SeqCst);
                json!({
                    "protocolVersion": "2025-03-26",
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "mock-mcp", "version": "0.0.1" },
                })
            }
            "tools/list" => {
                self.list_calls.fetch_add(1, Ordering::SeqCst);
                if self.options.fail_tools_list {
                    return Some(rpc_error(id, -32603, "tool registry unavailable"));
                }
                json!({
                    "tools": [{
                        "name": "echo",
                        "description": "Echo the input",
                        "inputSchema": { "type": "object" },
                    }]
                })
            }
            other => return Some(rpc_error(id, -32601, &format!("Method not found: {other}"))),
        };
        Some(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
    }
}

fn rpc_error(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(format!("Bearer {TEST_TOKEN}").as_str())
}

/// A running mock server
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<MockServer>,
}

impl TestServer {
    pub fn mcp_url(&self) -> String {
        format!("http://{}/mcp", self.addr)
    }

    pub fn sse_url(&self) -> String {
        format!("http://{}/sse", self.addr)
    }
}

/// Bind the mock server on an ephemeral port and serve it in the background
pub async fn spawn_mock_server(options: MockOptions) -> TestServer {
    let state = Arc::new(MockServer {
        options,
        ..MockServer::default()
    });

    let app = Router::new()
        .route("/mcp", post(streamable_post).delete(streamable_delete))
        .route("/sse", get(sse_connect))
        .route("/messages", post(sse_message))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer { addr, state }
}

async fn streamable_post(
    State(server): State<Arc<MockServer>>,
    headers: HeaderMap,
    Json(request): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let is_initialize = request.get("method").and_then(Value::as_str) == Some("initialize");
    if is_initialize && server.options.stall_handshake {
        std::future::pending::<()>().await;
    }
    if !is_initialize && !headers.contains_key(SESSION_ID_HEADER) {
        return (StatusCode::BAD_REQUEST, "missing session id").into_response();
    }

    let Some(message) = server.respond_to(&request) else {
        return StatusCode::ACCEPTED.into_response();
    };

    let mut response = if server.options.event_stream_replies {
        (
            [(header::CONTENT_TYPE, "text/event-stream")],
            format!("event: message\ndata: {message}\n\n"),
        )
            .into_response()
    } else {
        Json(message).into_response()
    };
    if is_initialize {
        let id = server.new_session_id();
        response
            .headers_mut()
            .insert(SESSION_ID_HEADER, HeaderValue::from_str(&id).unwrap());
    }
    response
}

async fn streamable_delete(State(server): State<Arc<MockServer>>, headers: HeaderMap) -> StatusCode {
    if server.options.delete_not_allowed {
        return StatusCode::METHOD_NOT_ALLOWED;
    }
    if !headers.contains_key(SESSION_ID_HEADER) {
        return StatusCode::BAD_REQUEST;
    }
    server.deletes.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

async fn sse_connect(
    State(server): State<Arc<MockServer>>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let session_id = server.new_session_id();
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    server
        .sse_sessions
        .lock()
        .unwrap()
        .insert(session_id.clone(), tx);

    let stall = server.options.stall_handshake;
    let endpoint = stream::once(async move {
        if stall {
            std::future::pending::<()>().await;
        }
        Ok::<_, Infallible>(
            Event::default()
                .event("endpoint")
                .data(format!("/messages?sessionId={session_id}")),
        )
    });
    let messages = stream::unfold(rx, |mut rx| async move {
        let data = rx.recv().await?;
        Some((
            Ok::<_, Infallible>(Event::default().event("message").data(data)),
            rx,
        ))
    });
    Ok(Sse::new(endpoint.chain(messages)))
}

async fn sse_message(
    State(server): State<Arc<MockServer>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(request): Json<Value>,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    let Some(session_id) = params.get("sessionId") else {
        return StatusCode::BAD_REQUEST;
    };
    let Some(tx) = server.sse_sessions.lock().unwrap().get(session_id).cloned() else {
        return StatusCode::NOT_FOUND;
    };

    if let Some(message) = server.respond_to(&request) {
        // the client may already be gone
        let _ = tx.send(message.to_string());
    }
    StatusCode::ACCEPTED
}
