//! Ticket Live - Real-time ticket updates for operator views
//!
//! Keeps ticket lists and ticket detail screens in line with the backend by
//! merging pushed status updates, with a polling timer as the safety net.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            TICKET LIVE CLIENT                           │
//! │                                                                         │
//! │  ┌──────────────┐        ┌──────────────────────────────────────────┐  │
//! │  │ HttpTransport│──SSE──►│  EventStream (one shared connection)     │  │
//! │  │  (reqwest)   │        │  parse → decode → filter → fan-out       │  │
//! │  └──────────────┘        └──────┬──────────────┬──────────────┬─────┘  │
//! │                                 │              │              │        │
//! │                          ┌──────▼─────┐ ┌──────▼─────┐ ┌──────▼─────┐  │
//! │                          │ EventHook  │ │ EventHook  │ │ EventHook  │  │
//! │                          └──────┬─────┘ └──────┬─────┘ └──────┬─────┘  │
//! │                          ┌──────▼─────┐ ┌──────▼─────┐ ┌──────▼─────┐  │
//! │                          │ TicketList │ │TicketDetail│ │Notification│  │
//! │                          │ patch/load │ │  refetch   │ │    Feed    │  │
//! │                          └──────▲─────┘ └──────▲─────┘ └────────────┘  │
//! │  ┌──────────────┐               │              │                       │
//! │  │  ApiClient   │◄──────────────┴──────────────┘                       │
//! │  │  (REST)      │◄── PollingFallback (15s list / 10s detail)           │
//! │  └──────────────┘                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod detail;
pub mod events;
pub mod highlight;
pub mod hook;
pub mod list;
pub mod notifications;
pub mod refresh;
pub mod sse;
pub mod stream;

#[cfg(test)]
mod testing;

use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

pub use api::{ApiClient, ListQuery, Ticket, TicketApi, TicketWithDetails};
pub use config::LiveConfig;
pub use detail::{DetailState, TicketDetail};
pub use events::{TicketUpdateEvent, TimedEvent};
pub use hook::EventHook;
pub use list::{ListOutcome, TicketList};
pub use notifications::NotificationFeed;
pub use refresh::PollingFallback;
pub use stream::{ConnectionState, EventStream, EventTransport, HttpTransport};

/// Client error types
#[derive(Debug, Error)]
pub enum LiveError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, LiveError>;

/// Entry point: one API client, one event stream, one notification feed
///
/// Views mounted from the same client share its stream connection. Nothing
/// connects until a view or the notification feed is mounted.
pub struct LiveClient {
    config: LiveConfig,
    api: Arc<dyn TicketApi>,
    stream: EventStream,
    notifications: NotificationFeed,
    notification_hook: Mutex<Option<EventHook>>,
}

impl LiveClient {
    /// Build HTTP-backed client; must be called within a Tokio runtime
    pub fn new(config: LiveConfig) -> Result<Self> {
        config.validate()?;
        let api = ApiClient::new(
            &config.api_url,
            config.api_token.as_deref(),
            config.request_timeout(),
        )?;
        let transport = HttpTransport::new(config.events_url(), config.request_timeout())?;
        tracing::info!("Ticket live client for {}", config.api_url);
        Ok(Self::with_parts(config, Arc::new(api), Arc::new(transport)))
    }

    /// Build from explicit parts
    pub fn with_parts(
        config: LiveConfig,
        api: Arc<dyn TicketApi>,
        transport: Arc<dyn EventTransport>,
    ) -> Self {
        let stream = EventStream::new(transport, config.reconnect_delay());
        let notifications = NotificationFeed::new(config.notification_cap);

        Self {
            config,
            api,
            stream,
            notifications,
            notification_hook: Mutex::new(None),
        }
    }

    /// Start recording pushed updates into the notification feed
    ///
    /// Opens the shared stream if nothing else holds it. Later calls are
    /// no-ops. Must be called within a Tokio runtime.
    pub fn start_notifications(&self) -> &NotificationFeed {
        let mut hook = self.notification_hook.lock();
        if hook.is_none() {
            let feed = self.notifications.clone();
            *hook = Some(EventHook::mount(&self.stream, move |event| {
                feed.push(event.clone());
            }));
        }
        &self.notifications
    }

    /// Query for the first page at the configured page size
    pub fn default_query(&self) -> ListQuery {
        ListQuery {
            per_page: self.config.page_size,
            ..Default::default()
        }
    }

    /// Mount a live list: subscribe, load once, start polling
    ///
    /// A failed initial load is logged; the poller retries it.
    pub async fn mount_list(&self, query: ListQuery) -> TicketListView {
        self.start_notifications();
        let list = TicketList::new(
            self.api.clone(),
            query,
            self.config.highlight_window(),
            self.config.enrich_settle(),
        );
        let target = list.clone();
        let hook = EventHook::mount(&self.stream, move |event| {
            target.apply(event);
        });

        if let Err(e) = list.reload().await {
            tracing::warn!("Initial ticket list load failed: {}", e);
        }
        let poller = PollingFallback::spawn(Arc::new(list.clone()), self.config.list_poll_interval());

        TicketListView { list, hook, poller }
    }

    /// Mount a live detail view for one ticket
    pub async fn mount_detail(&self, ticket_id: &str) -> TicketDetailView {
        self.start_notifications();
        let detail = TicketDetail::new(self.api.clone(), ticket_id, self.config.enrich_settle());
        let target = detail.clone();
        let hook = EventHook::mount(&self.stream, move |event| {
            target.on_event(event);
        });

        if let Err(e) = detail.reload().await {
            tracing::warn!("Initial load of ticket {} failed: {}", ticket_id, e);
        }
        let poller =
            PollingFallback::spawn(Arc::new(detail.clone()), self.config.detail_poll_interval());

        TicketDetailView {
            detail,
            hook,
            poller,
        }
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    pub fn api(&self) -> &Arc<dyn TicketApi> {
        &self.api
    }

    pub fn stream(&self) -> &EventStream {
        &self.stream
    }

    pub fn notifications(&self) -> &NotificationFeed {
        &self.notifications
    }
}

/// A mounted list; unmounts everything on drop
pub struct TicketListView {
    list: TicketList,
    hook: EventHook,
    poller: PollingFallback,
}

impl TicketListView {
    pub fn list(&self) -> &TicketList {
        &self.list
    }

    pub fn hook(&self) -> &EventHook {
        &self.hook
    }

    pub fn poller(&self) -> &PollingFallback {
        &self.poller
    }
}

impl Drop for TicketListView {
    fn drop(&mut self) {
        self.hook.unmount();
        self.poller.stop();
        self.list.unmount();
    }
}

/// A mounted detail view; unmounts everything on drop
pub struct TicketDetailView {
    detail: TicketDetail,
    hook: EventHook,
    poller: PollingFallback,
}

impl TicketDetailView {
    pub fn detail(&self) -> &TicketDetail {
        &self.detail
    }

    pub fn hook(&self) -> &EventHook {
        &self.hook
    }

    pub fn poller(&self) -> &PollingFallback {
        &self.poller
    }
}

impl Drop for TicketDetailView {
    fn drop(&mut self) {
        self.hook.unmount();
        self.poller.stop();
        self.detail.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Pagination, TicketPage};
    use crate::testing::{wait_until, ChannelTransport, FakeApi};
    use std::time::Duration;

    fn page(ids: &[&str]) -> TicketPage {
        TicketPage {
            data: ids.iter().map(|id| Ticket::new(*id, "new")).collect(),
            pagination: Pagination {
                page: 1,
                per_page: 20,
                total: ids.len() as u64,
                total_pages: 1,
            },
        }
    }

    fn client(api: &Arc<FakeApi>, transport: &Arc<ChannelTransport>) -> LiveClient {
        LiveClient::with_parts(LiveConfig::default(), api.clone(), transport.clone())
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = LiveConfig {
            notification_cap: 0,
            ..Default::default()
        };
        assert!(matches!(LiveClient::new(config), Err(LiveError::Config(_))));
    }

    #[tokio::test]
    async fn test_notifications_record_updates() {
        let api = FakeApi::new();
        let transport = ChannelTransport::new();
        let conn = transport.push_connection();
        let client = client(&api, &transport);
        client.start_notifications();

        conn.send_frame(r#"{"type":"connected"}"#);
        conn.send_frame(r#"{"type":"ticket_update","ticket_id":"t1","status":"open"}"#);
        conn.send_frame(r#"{"type":"ticket_update","ticket_id":"t2","status":"new"}"#);
        wait_until(|| client.notifications().len() == 2).await;

        let latest = client.notifications().latest().unwrap();
        assert_eq!(latest.event.ticket_id, "t2");
    }

    #[tokio::test]
    async fn test_building_client_opens_no_connection() {
        let api = FakeApi::new();
        let transport = ChannelTransport::new();
        let client = client(&api, &transport);
        tokio::task::yield_now().await;

        assert_eq!(client.stream().subscriber_count(), 0);
        assert_eq!(transport.connect_count(), 0);
        assert_eq!(client.stream().state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_start_notifications_subscribes_once() {
        let api = FakeApi::new();
        let transport = ChannelTransport::new();
        let _conn = transport.push_connection();
        let client = client(&api, &transport);

        client.start_notifications();
        client.start_notifications();
        assert_eq!(client.stream().subscriber_count(), 1);
        wait_until(|| transport.connect_count() == 1).await;
    }

    #[tokio::test]
    async fn test_views_share_one_connection() {
        let api = FakeApi::new();
        api.set_page(page(&["t1", "t2"]));
        api.set_detail(TicketWithDetails {
            ticket: Ticket::new("t1", "new"),
            ..Default::default()
        });
        let transport = ChannelTransport::new();
        let conn = transport.push_connection();
        let client = client(&api, &transport);

        let list_view = client.mount_list(client.default_query()).await;
        let detail_view = client.mount_detail("t1").await;
        assert_eq!(client.stream().subscriber_count(), 3);
        assert_eq!(list_view.list().len(), 2);

        conn.send_frame(r#"{"type":"ticket_update","ticket_id":"t1","status":"progress"}"#);
        wait_until(|| list_view.list().get("t1").map(|t| t.status) == Some("progress".into())).await;
        wait_until(|| api.count("detail:t1") == 2).await;

        assert_eq!(transport.connect_count(), 1);
        assert!(list_view.list().is_highlighted("t1"));
        drop(detail_view);
    }

    #[tokio::test]
    async fn test_dropping_view_unmounts() {
        let api = FakeApi::new();
        api.set_page(page(&["t1"]));
        let transport = ChannelTransport::new();
        let conn = transport.push_connection();
        let client = client(&api, &transport);

        let view = client.mount_list(client.default_query()).await;
        let list = view.list().clone();
        assert_eq!(client.stream().subscriber_count(), 2);

        drop(view);
        assert_eq!(client.stream().subscriber_count(), 1);
        assert!(!list.is_mounted());

        conn.send_frame(r#"{"type":"ticket_update","ticket_id":"t1","status":"closed"}"#);
        wait_until(|| client.notifications().len() == 1).await;
        assert_eq!(list.get("t1").unwrap().status, "new");
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_polls_without_events() {
        let api = FakeApi::new();
        api.set_page(page(&["t1"]));
        let transport = ChannelTransport::new();
        let client = client(&api, &transport);

        let _view = client.mount_list(client.default_query()).await;
        assert_eq!(api.count("list"), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(api.count("list"), 3);
    }

    #[tokio::test]
    async fn test_failed_initial_load_still_mounts() {
        let api = FakeApi::new();
        api.set_fail_fetches(true);
        let transport = ChannelTransport::new();
        let client = client(&api, &transport);

        let view = client.mount_detail("t1").await;
        assert_eq!(view.detail().state(), DetailState::Loading);
        assert!(view.hook().is_mounted());
        assert!(view.poller().is_running());
    }
}
