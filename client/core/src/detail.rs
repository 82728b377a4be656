//! Detail Reconciliation Engine
//!
//! One ticket's full record. Any update for that ticket triggers a full
//! refetch, since status changes usually come with new assignment and audit
//! data that the event itself does not carry.

use crate::api::{TicketApi, TicketWithDetails};
use crate::events::TicketUpdateEvent;
use crate::refresh::Refresh;
use crate::Result;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// What the view currently shows
#[derive(Debug, Clone, PartialEq)]
pub enum DetailState {
    Loading,
    Loaded(Box<TicketWithDetails>),
    NotFound,
}

impl DetailState {
    pub fn record(&self) -> Option<&TicketWithDetails> {
        match self {
            DetailState::Loaded(record) => Some(record.as_ref()),
            _ => None,
        }
    }
}

struct DetailInner {
    api: Arc<dyn TicketApi>,
    ticket_id: String,
    state: RwLock<DetailState>,
    enriching: AtomicBool,
    settle_delay: Duration,
    mounted: AtomicBool,
    version: watch::Sender<u64>,
    pending: Mutex<Vec<JoinHandle<()>>>,
    reloads: AtomicU64,
    discarded: AtomicU64,
}

/// Reconciled detail record for one ticket
#[derive(Clone)]
pub struct TicketDetail {
    inner: Arc<DetailInner>,
}

impl TicketDetail {
    pub fn new(
        api: Arc<dyn TicketApi>,
        ticket_id: impl Into<String>,
        settle_delay: Duration,
    ) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(DetailInner {
                api,
                ticket_id: ticket_id.into(),
                state: RwLock::new(DetailState::Loading),
                enriching: AtomicBool::new(false),
                settle_delay,
                mounted: AtomicBool::new(true),
                version,
                pending: Mutex::new(Vec::new()),
                reloads: AtomicU64::new(0),
                discarded: AtomicU64::new(0),
            }),
        }
    }

    pub fn ticket_id(&self) -> &str {
        &self.inner.ticket_id
    }

    /// React to a pushed update
    ///
    /// Returns true when a refetch was started. Updates for other tickets are
    /// ignored.
    pub fn on_event(&self, event: &TicketUpdateEvent) -> bool {
        if !self.is_mounted() || event.ticket_id != self.inner.ticket_id {
            return false;
        }
        tracing::debug!("Ticket {} updated to {}, refetching", event.ticket_id, event.status);
        self.spawn_reload(Duration::ZERO);
        true
    }

    /// Refetch the full record
    ///
    /// A failed fetch leaves the current state untouched.
    pub async fn reload(&self) -> Result<()> {
        self.inner.reloads.fetch_add(1, Ordering::Relaxed);
        let result = self.inner.api.ticket_detail(&self.inner.ticket_id).await;

        if !self.is_mounted() {
            self.inner.discarded.fetch_add(1, Ordering::Relaxed);
            return result.map(|_| ());
        }

        let next = match result? {
            Some(record) => DetailState::Loaded(Box::new(record)),
            None => DetailState::NotFound,
        };
        {
            // Unmount flips the flag under this lock, so the check and the write are atomic.
            let mut state = self.inner.state.write();
            if !self.is_mounted() {
                self.inner.discarded.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
            *state = next;
        }
        self.bump();
        Ok(())
    }

    /// Change the ticket status, then reload immediately
    pub async fn set_status(&self, status: &str) -> Result<()> {
        self.inner.api.update_status(&self.inner.ticket_id, status).await?;
        tracing::info!("Ticket {} status set to {}", self.inner.ticket_id, status);
        self.reload().await
    }

    /// Request AI enrichment and reload after the settle delay
    ///
    /// The delayed reload is a guess at when enrichment finishes, not a
    /// confirmation. If the job takes longer, the record appears on the next
    /// pushed update or polling tick.
    pub async fn enrich(&self) -> Result<()> {
        self.inner.enriching.store(true, Ordering::Release);
        self.bump();
        let result = self.inner.api.enrich(&self.inner.ticket_id).await;
        self.inner.enriching.store(false, Ordering::Release);
        self.bump();

        result?;
        tracing::info!("Enrichment requested for ticket {}", self.inner.ticket_id);
        self.spawn_reload(self.inner.settle_delay);
        Ok(())
    }

    /// Stop reconciling; later fetch results are dropped
    pub fn unmount(&self) {
        {
            let _state = self.inner.state.write();
            if !self.inner.mounted.swap(false, Ordering::AcqRel) {
                return;
            }
        }
        for handle in self.inner.pending.lock().drain(..) {
            handle.abort();
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.load(Ordering::Acquire)
    }

    pub fn state(&self) -> DetailState {
        self.inner.state.read().clone()
    }

    pub fn record(&self) -> Option<TicketWithDetails> {
        self.inner.state.read().record().cloned()
    }

    pub fn is_enriching(&self) -> bool {
        self.inner.enriching.load(Ordering::Acquire)
    }

    /// Fetches started so far
    pub fn reload_count(&self) -> u64 {
        self.inner.reloads.load(Ordering::Relaxed)
    }

    /// Fetches that resolved after unmount
    pub fn discarded_reloads(&self) -> u64 {
        self.inner.discarded.load(Ordering::Relaxed)
    }

    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }

    fn bump(&self) {
        self.inner.version.send_modify(|v| *v += 1);
    }

    fn spawn_reload(&self, delay: Duration) {
        let detail = self.clone();
        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = detail.reload().await {
                tracing::warn!("Ticket {} reload failed: {}", detail.ticket_id(), e);
            }
        });

        let mut pending = self.inner.pending.lock();
        pending.retain(|h| !h.is_finished());
        if self.is_mounted() {
            pending.push(handle);
        } else {
            handle.abort();
        }
    }
}

#[async_trait]
impl Refresh for TicketDetail {
    async fn refresh(&self) -> Result<()> {
        self.reload().await
    }
}
