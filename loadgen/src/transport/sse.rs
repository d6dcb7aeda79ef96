//! Legacy HTTP+SSE transport
//!
//! The session holds a long-lived GET event stream. The server announces the
//! POST endpoint in an `endpoint` event; requests are POSTed there and their
//! responses arrive as `message` events, routed to waiters by JSON-RPC id by
//! a background reader task.
//!
//! The bearer credential is set as a default header on the HTTP client, so
//! both the event-stream request and the POSTs carry it.

use super::error::TransportError;
use super::event_stream::{SseDecoder, SseEvent};
use super::jsonrpc::{Message, Notification, Request};
use bytes::Bytes;
use dashmap::DashMap;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Response, Url};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

type EventStream = BoxStream<'static, reqwest::Result<Bytes>>;
type PendingMap = DashMap<u64, oneshot::Sender<Message>>;

/// State shared with the reader task
#[derive(Default)]
struct Shared {
    pending: PendingMap,
    closed: AtomicBool,
}

pub struct SseSession {
    http: Client,
    post_url: Url,
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
    next_id: AtomicU64,
}

/// Removes a pending waiter when the request future finishes or is dropped
/// (e.g. by the operation timeout)
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

impl SseSession {
    /// Open the event stream, wait for the endpoint event, and perform the
    /// MCP handshake
    pub async fn connect(endpoint: Url, token: Option<String>) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        if let Some(ref token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| TransportError::Protocol(format!("invalid credential: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        let http = Client::builder().default_headers(headers).build()?;

        let response = http
            .get(endpoint.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let mut stream: EventStream = response.bytes_stream().boxed();
        let mut decoder = SseDecoder::new();
        let (post_url, backlog) = wait_for_endpoint(&endpoint, &mut stream, &mut decoder).await?;

        let shared = Arc::new(Shared::default());
        let reader = tokio::spawn(read_events(stream, decoder, backlog, shared.clone()));

        // Dropping the session on a failed handshake aborts the reader
        let session = Self {
            http,
            post_url,
            shared,
            reader,
            next_id: AtomicU64::new(0),
        };

        let id = session.next_id();
        session.call(&Request::initialize(id)).await?.into_result()?;
        session.notify(&Notification::initialized()).await?;
        debug!("SSE session established (endpoint: {})", session.post_url);
        Ok(session)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// POST a request and wait for its response on the event stream
    pub async fn call(&self, request: &Request) -> Result<Message, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.shared.pending.insert(request.id, tx);
        let _guard = PendingGuard {
            pending: &self.shared.pending,
            id: request.id,
        };
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        let response = self
            .http
            .post(self.post_url.clone())
            .json(request)
            .send()
            .await?;
        ensure_success(response).await?;

        rx.await.map_err(|_| TransportError::Closed)
    }

    async fn notify(&self, notification: &Notification) -> Result<(), TransportError> {
        let response = self
            .http
            .post(self.post_url.clone())
            .json(notification)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    pub async fn list_tools(&self) -> Result<(), TransportError> {
        let id = self.next_id();
        self.call(&Request::list_tools(id)).await?.into_result()?;
        Ok(())
    }

    /// Stop the reader and drop the event stream
    pub async fn close(self) -> Result<(), TransportError> {
        self.shared.closed.store(true, Ordering::Release);
        self.reader.abort();
        self.shared.pending.clear();
        Ok(())
    }
}

impl Drop for SseSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
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

/// Read until the `endpoint` event. Events that arrived in the same chunk
/// after it are returned for the reader task to dispatch.
async fn wait_for_endpoint(
    base: &Url,
    stream: &mut EventStream,
    decoder: &mut SseDecoder,
) -> Result<(Url, Vec<SseEvent>), TransportError> {
    while let Some(chunk) = stream.next().await {
        let mut events = decoder.feed(&chunk?);
        if let Some(pos) = events.iter().position(|e| e.event == "endpoint") {
            let backlog = events.split_off(pos + 1);
            let endpoint = &events[pos].data;
            let url = base
                .join(endpoint.trim())
                .map_err(|e| TransportError::InvalidUrl(format!("{endpoint}: {e}")))?;
            return Ok((url, backlog));
        }
    }
    Err(TransportError::Protocol(
        "event stream ended before endpoint event".into(),
    ))
}

async fn read_events(
    mut stream: EventStream,
    mut decoder: SseDecoder,
    backlog: Vec<SseEvent>,
    shared: Arc<Shared>,
) {
    for event in backlog {
        dispatch(&shared.pending, event);
    }
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                for event in decoder.feed(&bytes) {
                    dispatch(&shared.pending, event);
                }
            }
            Err(e) => {
                debug!("SSE stream error: {}", e);
                break;
            }
        }
    }
    // Wake every waiter with a closed-session error
    shared.closed.store(true, Ordering::Release);
    shared.pending.clear();
}

fn dispatch(pending: &PendingMap, event: SseEvent) {
    if event.event != "message" {
        return;
    }
    match Message::parse(&event.data) {
        Ok(message) => {
            if let Some(id) = message.response_id()
                && let Some((_, tx)) = pending.remove(&id)
            {
                let _ = tx.send(message);
            }
        }
        Err(e) => debug!("Ignoring unparsable SSE message: {}", e),
    }
}
