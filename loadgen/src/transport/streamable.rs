//! Streamable HTTP transport
//!
//! Every JSON-RPC message is POSTed to the target URL. The bearer credential
//! is attached to each outgoing request. Responses come back either as a
//! plain JSON body or as a short event stream carrying the response.

use super::error::TransportError;
use super::event_stream::SseDecoder;
use super::jsonrpc::{Message, Notification, Request};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

pub const SESSION_ID_HEADER: &str = "mcp-session-id";
const ACCEPT_BOTH: &str = "application/json, text/event-stream";

pub struct StreamableSession {
    http: Client,
    endpoint: Url,
    token: Option<String>,
    session_id: Option<String>,
    next_id: AtomicU64,
}

impl StreamableSession {
    /// Open a client and perform the MCP handshake
    pub async fn connect(endpoint: Url, token: Option<String>) -> Result<Self, TransportError> {
        let http = Client::builder().build()?;
        let mut session = Self {
            http,
            endpoint,
            token,
            session_id: None,
            next_id: AtomicU64::new(0),
        };

        let id = session.next_id();
        let response = session.post(&Request::initialize(id)).await?;
        session.session_id = header_session_id(&response);
        let message = read_response(response, id).await?;
        message.into_result()?;

        session.notify(&Notification::initialized()).await?;
        debug!(
            "Streamable HTTP session established (session id: {:?})",
            session.session_id
        );
        Ok(session)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Build a request with the credential and session id attached
    fn request(&self, method: Method) -> RequestBuilder {
        let mut req = self
            .http
            .request(method, self.endpoint.clone())
            .header(ACCEPT, ACCEPT_BOTH);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }
        if let Some(ref id) = self.session_id {
            req = req.header(SESSION_ID_HEADER, id);
        }
        req
    }

    async fn post<T: serde::Serialize>(&self, body: &T) -> Result<Response, TransportError> {
        let response = self.request(Method::POST).json(body).send().await?;
        ensure_success(response).await
    }

    async fn notify(&self, notification: &Notification) -> Result<(), TransportError> {
        self.post(notification).await?;
        Ok(())
    }

    /// Issue one request and wait for its response
    pub async fn call(&self, request: &Request) -> Result<Message, TransportError> {
        let response = self.post(request).await?;
        read_response(response, request.id).await
    }

    pub async fn list_tools(&self) -> Result<(), TransportError> {
        let id = self.next_id();
        self.call(&Request::list_tools(id)).await?.into_result()?;
        Ok(())
    }

    /// Terminate the server-side session. Servers that do not support
    /// explicit termination answer 405, which is not an error.
    pub async fn close(self) -> Result<(), TransportError> {
        if self.session_id.is_none() {
            return Ok(());
        }
        let response = self.request(Method::DELETE).send().await?;
        if response.status() == StatusCode::METHOD_NOT_ALLOWED {
            return Ok(());
        }
        ensure_success(response).await?;
        Ok(())
    }
}

fn header_session_id(response: &Response) -> Option<String> {
    response
        .headers()
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

async fn ensure_success(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Extract the response to request `id` from a JSON or event-stream body
async fn read_response(response: Response, id: u64) -> Result<Message, TransportError> {
    let is_event_stream = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream"));

    if !is_event_stream {
        let text = response.text().await?;
        let message = Message::parse(&text)?;
        if message.response_id() != Some(id) {
            return Err(TransportError::Protocol(format!(
                "expected response to request {id}, got {text}"
            )));
        }
        return Ok(message);
    }

    let mut decoder = SseDecoder::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        for event in decoder.feed(&chunk?) {
            if let Some(message) = match_event(&event.event, &event.data, id) {
                return Ok(message);
            }
        }
    }
    if let Some(event) = decoder.finish()
        && let Some(message) = match_event(&event.event, &event.data, id)
    {
        return Ok(message);
    }
    Err(TransportError::Protocol(format!(
        "event stream ended before response to request {id}"
    )))
}

fn match_event(event: &str, data: &str, id: u64) -> Option<Message> {
    if event != "message" {
        return None;
    }
    match Message::parse(data) {
        Ok(message) if message.response_id() == Some(id) => Some(message),
        Ok(_) => None,
        Err(e) => {
            debug!("Ignoring unparsable event data: {}", e);
            None
        }
    }
}
