//! Test doubles shared by the unit tests

use crate::api::{EnrichAllSummary, ListQuery, TicketApi, TicketPage, TicketWithDetails};
use crate::stream::{ByteStream, EventTransport};
use crate::{LiveError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

/// Poll `cond` on a 1ms step until it holds; panics after five seconds
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..5000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached in time");
}

// =============================================================================
// Transport
// =============================================================================

/// In-memory push transport; each `connect` takes the next queued script
#[derive(Default)]
pub struct ChannelTransport {
    queued: Mutex<VecDeque<Scripted>>,
    last_ids: Mutex<Vec<Option<String>>>,
}

enum Scripted {
    Open(mpsc::UnboundedReceiver<Result<Bytes>>),
    Refuse(String),
}

/// Server side of one queued connection; dropping it ends the stream
pub struct ConnectionHandle {
    tx: mpsc::UnboundedSender<Result<Bytes>>,
}

impl ConnectionHandle {
    pub fn send_raw(&self, raw: &str) {
        let _ = self.tx.send(Ok(Bytes::from(raw.to_string())));
    }

    pub fn send_frame(&self, json: &str) {
        self.send_raw(&format!("data: {json}\n\n"));
    }

    pub fn fail(&self, reason: &str) {
        let _ = self.tx.send(Err(LiveError::Transport(reason.to_string())));
    }
}

impl ChannelTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_connection(&self) -> ConnectionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        self.queued.lock().push_back(Scripted::Open(rx));
        ConnectionHandle { tx }
    }

    /// Make the next `connect` fail before any bytes flow
    pub fn refuse_connection(&self, reason: &str) {
        self.queued.lock().push_back(Scripted::Refuse(reason.to_string()));
    }

    pub fn connect_count(&self) -> usize {
        self.last_ids.lock().len()
    }

    pub fn last_event_ids(&self) -> Vec<Option<String>> {
        self.last_ids.lock().clone()
    }
}

#[async_trait]
impl EventTransport for ChannelTransport {
    async fn connect(&self, last_event_id: Option<String>) -> Result<ByteStream> {
        self.last_ids.lock().push(last_event_id);
        let next = self.queued.lock().pop_front();
        match next {
            Some(Scripted::Refuse(reason)) => Err(LiveError::Transport(reason)),
            Some(Scripted::Open(rx)) => Ok(futures_util::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed()),
            // Nothing queued: behave like a connection that stays silent.
            None => Ok(futures_util::stream::pending::<Result<Bytes>>().boxed()),
        }
    }
}

// =============================================================================
// API
// =============================================================================

/// Scriptable `TicketApi`
///
/// Calls are recorded when they start, before any gate is awaited.
#[derive(Default)]
pub struct FakeApi {
    page: Mutex<TicketPage>,
    details: Mutex<HashMap<String, TicketWithDetails>>,
    calls: Mutex<Vec<String>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    fail_fetches: AtomicBool,
    fail_actions: AtomicBool,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_page(&self, page: TicketPage) {
        *self.page.lock() = page;
    }

    pub fn set_detail(&self, detail: TicketWithDetails) {
        self.details.lock().insert(detail.ticket.id.clone(), detail);
    }

    /// Make fetches wait until `release` hands out permits
    pub fn hold_fetches(&self) {
        *self.gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, fetches: usize) {
        if let Some(gate) = self.gate.lock().as_ref() {
            gate.add_permits(fetches);
        }
    }

    pub fn set_fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_actions(&self, fail: bool) {
        self.fail_actions.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    async fn pass_gate(&self) {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }

    fn fetch_outcome(&self) -> Result<()> {
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(LiveError::Transport("connection refused".into()));
        }
        Ok(())
    }

    fn action_outcome(&self) -> Result<()> {
        if self.fail_actions.load(Ordering::SeqCst) {
            return Err(LiveError::Status {
                status: 500,
                message: "action failed".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TicketApi for FakeApi {
    async fn list_tickets(&self, _query: &ListQuery) -> Result<TicketPage> {
        self.record("list".into());
        self.pass_gate().await;
        self.fetch_outcome()?;
        Ok(self.page.lock().clone())
    }

    async fn ticket_detail(&self, id: &str) -> Result<Option<TicketWithDetails>> {
        self.record(format!("detail:{id}"));
        self.pass_gate().await;
        self.fetch_outcome()?;
        Ok(self.details.lock().get(id).cloned())
    }

    async fn update_status(&self, id: &str, status: &str) -> Result<()> {
        self.record(format!("status:{id}:{status}"));
        self.action_outcome()?;
        if let Some(detail) = self.details.lock().get_mut(id) {
            detail.ticket.status = status.to_string();
        }
        for row in self.page.lock().data.iter_mut().filter(|t| t.id == id) {
            row.status = status.to_string();
        }
        Ok(())
    }

    async fn enrich(&self, id: &str) -> Result<()> {
        self.record(format!("enrich:{id}"));
        self.action_outcome()
    }

    async fn enrich_all(&self) -> Result<EnrichAllSummary> {
        self.record("enrich_all".into());
        self.action_outcome()?;
        let total = self.page.lock().data.len() as u64;
        Ok(EnrichAllSummary {
            total,
            triggered: total,
            errors: vec![],
        })
    }
}
