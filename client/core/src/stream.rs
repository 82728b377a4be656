//! Event Stream Client
//!
//! Owns the single push connection, decodes frames and dispatches recognized
//! ticket updates to every live subscription.

use crate::events::{decode, Decoded, TicketUpdateEvent};
use crate::sse::{SseFrame, SseParser};
use crate::{LiveError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Raw body chunks of one push connection
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Callback invoked once per recognized event
pub type EventCallback = Arc<dyn Fn(&TicketUpdateEvent) + Send + Sync>;

/// Opens push connections
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Open one connection, resuming after `last_event_id` when known
    async fn connect(&self, last_event_id: Option<String>) -> Result<ByteStream>;
}

/// `text/event-stream` over HTTP
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    /// Create a transport for the given events URL
    ///
    /// Only the connect phase is bounded by `connect_timeout`; the body of a
    /// push connection is open-ended.
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EventTransport for HttpTransport {
    async fn connect(&self, last_event_id: Option<String>) -> Result<ByteStream> {
        let mut req = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache");
        if let Some(id) = last_event_id {
            req = req.header("Last-Event-ID", id);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(LiveError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.bytes_stream().map(|chunk| chunk.map_err(LiveError::from)).boxed())
    }
}

/// Push connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No subscribers, no connection
    Idle,
    Connecting,
    Connected,
    /// Waiting out the retry delay after a drop
    Reconnecting,
}

/// Counters since the stream was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub connect_attempts: u64,
    pub connections_opened: u64,
    pub delivered: u64,
    pub ignored: u64,
    pub malformed: u64,
}

#[derive(Default)]
struct Counters {
    connect_attempts: AtomicU64,
    connections_opened: AtomicU64,
    delivered: AtomicU64,
    ignored: AtomicU64,
    malformed: AtomicU64,
}

struct SubscriberSlot {
    id: u64,
    active: Arc<AtomicBool>,
    callback: EventCallback,
}

struct StreamInner {
    transport: Arc<dyn EventTransport>,
    reconnect_delay: Duration,
    subscribers: RwLock<Vec<SubscriberSlot>>,
    connection: Mutex<Option<JoinHandle<()>>>,
    state: RwLock<ConnectionState>,
    next_id: AtomicU64,
    counters: Counters,
}

/// Shared event stream
///
/// Cloning is cheap; all clones share one connection. The connection opens with
/// the first subscription and closes when the last one is torn down. Must be
/// subscribed to from within a Tokio runtime.
#[derive(Clone)]
pub struct EventStream {
    inner: Arc<StreamInner>,
}

impl EventStream {
    /// Create a stream; nothing connects until the first subscription
    pub fn new(transport: Arc<dyn EventTransport>, reconnect_delay: Duration) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                transport,
                reconnect_delay,
                subscribers: RwLock::new(Vec::new()),
                connection: Mutex::new(None),
                state: RwLock::new(ConnectionState::Idle),
                next_id: AtomicU64::new(1),
                counters: Counters::default(),
            }),
        }
    }

    /// Register a callback for recognized ticket updates
    pub fn subscribe<F>(&self, on_event: F) -> Subscription
    where
        F: Fn(&TicketUpdateEvent) + Send + Sync + 'static,
    {
        self.subscribe_arc(Arc::new(on_event))
    }

    pub(crate) fn subscribe_arc(&self, callback: EventCallback) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));

        let mut connection = self.inner.connection.lock();
        self.inner.subscribers.write().push(SubscriberSlot {
            id,
            active: active.clone(),
            callback,
        });
        if connection.is_none() {
            tracing::info!("Opening event stream");
            *self.inner.state.write() = ConnectionState::Connecting;
            *connection = Some(tokio::spawn(run_connection(self.inner.clone())));
        }

        Subscription {
            id,
            active,
            stream: Arc::downgrade(&self.inner),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    pub fn stats(&self) -> StreamStats {
        let c = &self.inner.counters;
        StreamStats {
            connect_attempts: c.connect_attempts.load(Ordering::Relaxed),
            connections_opened: c.connections_opened.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            ignored: c.ignored.load(Ordering::Relaxed),
            malformed: c.malformed.load(Ordering::Relaxed),
        }
    }
}

impl StreamInner {
    fn remove(&self, id: u64) {
        let mut connection = self.connection.lock();
        let remaining = {
            let mut subscribers = self.subscribers.write();
            subscribers.retain(|slot| slot.id != id);
            subscribers.len()
        };
        if remaining == 0 {
            if let Some(handle) = connection.take() {
                tracing::info!("Closing event stream");
                handle.abort();
            }
            *self.state.write() = ConnectionState::Idle;
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    fn dispatch_frame(&self, frame: &SseFrame) {
        if !frame.is_message() {
            self.counters.ignored.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("Ignoring named event '{}'", frame.event);
            return;
        }

        match decode(&frame.data) {
            Decoded::Update(event) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                // Callbacks run outside the lock so they may (un)subscribe.
                let targets: Vec<_> = self
                    .subscribers
                    .read()
                    .iter()
                    .map(|slot| (slot.active.clone(), slot.callback.clone()))
                    .collect();
                for (active, callback) in targets {
                    if active.load(Ordering::Acquire) {
                        callback(&event);
                    }
                }
            }
            Decoded::Ignored { kind } => {
                self.counters.ignored.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Ignoring '{}' message", kind);
            }
            Decoded::Malformed { reason } => {
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Dropping malformed message: {}", reason);
            }
        }
    }
}

async fn run_connection(inner: Arc<StreamInner>) {
    let mut parser = SseParser::new();

    loop {
        inner.counters.connect_attempts.fetch_add(1, Ordering::Relaxed);
        let last_event_id = parser.last_event_id().map(str::to_owned);

        match inner.transport.connect(last_event_id).await {
            Ok(mut body) => {
                inner.counters.connections_opened.fetch_add(1, Ordering::Relaxed);
                inner.set_state(ConnectionState::Connected);
                tracing::debug!("Event stream connected");

                while let Some(chunk) = body.next().await {
                    match chunk {
                        Ok(chunk) => {
                            for frame in parser.feed(&chunk) {
                                inner.dispatch_frame(&frame);
                            }
                        }
                        Err(e) => {
                            tracing::debug!("Event stream read failed: {}", e);
                            break;
                        }
                    }
                }
                parser.reset_connection();
                tracing::debug!("Event stream dropped");
            }
            Err(e) => {
                tracing::debug!("Event stream connect failed: {}", e);
            }
        }

        inner.set_state(ConnectionState::Reconnecting);
        let delay = parser
            .retry_ms()
            .map(Duration::from_millis)
            .unwrap_or(inner.reconnect_delay);
        tokio::time::sleep(delay).await;
        inner.set_state(ConnectionState::Connecting);
    }
}

/// Registration handle; tears down on drop
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
    stream: Weak<StreamInner>,
}

impl Subscription {
    /// Stop receiving events
    pub fn unsubscribe(self) {}

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(inner) = self.stream.upgrade() {
            inner.remove(self.id);
        }
    }
}
