//! List Reconciliation Engine
//!
//! Keeps a ticket list in line with the server. Updates for rows already on
//! screen are patched in place; an update for an unknown id means a new ticket,
//! so the whole page is fetched again instead.

use crate::api::{EnrichAllSummary, ListQuery, Pagination, Ticket, TicketApi};
use crate::events::TicketUpdateEvent;
use crate::highlight::HighlightSet;
use crate::refresh::Refresh;
use crate::Result;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// What `apply` did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOutcome {
    /// The row was updated in place
    Patched,
    /// The id is not on screen; a full reload was started
    ReloadScheduled,
    /// The list is unmounted; nothing happened
    Unmounted,
}

/// Counters for one list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListStats {
    pub patches: u64,
    pub reloads_started: u64,
    pub reloads_applied: u64,
    pub reloads_failed: u64,
    /// Fetches that resolved after unmount
    pub discarded_reloads: u64,
}

#[derive(Default)]
struct Counters {
    patches: AtomicU64,
    reloads_started: AtomicU64,
    reloads_applied: AtomicU64,
    reloads_failed: AtomicU64,
    discarded_reloads: AtomicU64,
}

struct ListInner {
    api: Arc<dyn TicketApi>,
    query: RwLock<ListQuery>,
    rows: RwLock<Vec<Ticket>>,
    pagination: RwLock<Pagination>,
    highlights: HighlightSet,
    settle_delay: Duration,
    mounted: AtomicBool,
    version: watch::Sender<u64>,
    pending: Mutex<Vec<JoinHandle<()>>>,
    counters: Counters,
}

/// Reconciled ticket list for one view
#[derive(Clone)]
pub struct TicketList {
    inner: Arc<ListInner>,
}

impl TicketList {
    pub fn new(
        api: Arc<dyn TicketApi>,
        query: ListQuery,
        highlight_window: Duration,
        settle_delay: Duration,
    ) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(ListInner {
                api,
                query: RwLock::new(query),
                rows: RwLock::new(Vec::new()),
                pagination: RwLock::new(Pagination::default()),
                highlights: HighlightSet::new(highlight_window),
                settle_delay,
                mounted: AtomicBool::new(true),
                version,
                pending: Mutex::new(Vec::new()),
                counters: Counters::default(),
            }),
        }
    }

    /// Merge one update into the list
    pub fn apply(&self, event: &TicketUpdateEvent) -> ListOutcome {
        if !self.is_mounted() {
            return ListOutcome::Unmounted;
        }
        self.inner.highlights.mark(&event.ticket_id);

        let patched = {
            let mut rows = self.inner.rows.write();
            if !self.is_mounted() {
                return ListOutcome::Unmounted;
            }
            match rows.iter_mut().find(|row| row.id == event.ticket_id) {
                Some(row) => {
                    row.status = event.status.clone();
                    if let Some(manager) = &event.manager {
                        row.manager = Some(manager.clone());
                    }
                    true
                }
                None => false,
            }
        };

        if patched {
            self.inner.counters.patches.fetch_add(1, Ordering::Relaxed);
            self.bump();
            ListOutcome::Patched
        } else {
            tracing::debug!("Ticket {} not in list, reloading", event.ticket_id);
            self.spawn_reload(Duration::ZERO);
            ListOutcome::ReloadScheduled
        }
    }

    /// Replace the rows with a fresh page from the server
    ///
    /// On failure the previous rows stay in place.
    pub async fn reload(&self) -> Result<()> {
        self.inner.counters.reloads_started.fetch_add(1, Ordering::Relaxed);
        let query = self.inner.query.read().clone();
        let result = self.inner.api.list_tickets(&query).await;

        if !self.is_mounted() {
            self.inner.counters.discarded_reloads.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Discarding ticket list fetched after unmount");
            return result.map(|_| ());
        }

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                self.inner.counters.reloads_failed.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        let mut seen = HashSet::new();
        let rows: Vec<Ticket> = page
            .data
            .into_iter()
            .filter(|ticket| seen.insert(ticket.id.clone()))
            .collect();

        {
            // Unmount flips the flag under this lock, so the check and the write are atomic.
            let mut current = self.inner.rows.write();
            if !self.is_mounted() {
                self.inner.counters.discarded_reloads.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Discarding ticket list fetched after unmount");
                return Ok(());
            }
            *current = rows;
            *self.inner.pagination.write() = page.pagination;
        }
        self.inner.counters.reloads_applied.fetch_add(1, Ordering::Relaxed);
        self.bump();
        Ok(())
    }

    /// Change filters/page and reload
    pub async fn set_query(&self, query: ListQuery) -> Result<()> {
        *self.inner.query.write() = query;
        self.reload().await
    }

    /// Trigger bulk enrichment, then reload once the settle delay has passed
    ///
    /// The delay only gives the server's enrichment jobs a head start; nothing
    /// confirms they have finished by then, and the polling fallback picks up
    /// whatever the delayed reload misses.
    pub async fn enrich_all(&self) -> Result<EnrichAllSummary> {
        let summary = self.inner.api.enrich_all().await?;
        tracing::info!(
            "Bulk enrichment triggered for {}/{} tickets",
            summary.triggered,
            summary.total
        );
        self.spawn_reload(self.inner.settle_delay);
        Ok(summary)
    }

    /// Stop reconciling; later fetch results are dropped
    pub fn unmount(&self) {
        {
            let _rows = self.inner.rows.write();
            if !self.inner.mounted.swap(false, Ordering::AcqRel) {
                return;
            }
        }
        for handle in self.inner.pending.lock().drain(..) {
            handle.abort();
        }
        self.inner.highlights.clear();
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.load(Ordering::Acquire)
    }

    /// Current snapshot, in server order
    pub fn rows(&self) -> Vec<Ticket> {
        self.inner.rows.read().clone()
    }

    pub fn get(&self, id: &str) -> Option<Ticket> {
        self.inner.rows.read().iter().find(|row| row.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pagination(&self) -> Pagination {
        *self.inner.pagination.read()
    }

    pub fn query(&self) -> ListQuery {
        self.inner.query.read().clone()
    }

    pub fn is_highlighted(&self, id: &str) -> bool {
        self.inner.highlights.contains(id)
    }

    pub fn highlights(&self) -> &HighlightSet {
        &self.inner.highlights
    }

    /// Receiver that sees a new version after every change to the rows
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }

    pub fn stats(&self) -> ListStats {
        let c = &self.inner.counters;
        ListStats {
            patches: c.patches.load(Ordering::Relaxed),
            reloads_started: c.reloads_started.load(Ordering::Relaxed),
            reloads_applied: c.reloads_applied.load(Ordering::Relaxed),
            reloads_failed: c.reloads_failed.load(Ordering::Relaxed),
            discarded_reloads: c.discarded_reloads.load(Ordering::Relaxed),
        }
    }

    fn bump(&self) {
        self.inner.version.send_modify(|v| *v += 1);
    }

    fn spawn_reload(&self, delay: Duration) {
        let list = self.clone();
        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = list.reload().await {
                tracing::warn!("Ticket list reload failed: {}", e);
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
impl Refresh for TicketList {
    async fn refresh(&self) -> Result<()> {
        self.reload().await
    }
}
