//! Notification Aggregator

use crate::events::{TicketUpdateEvent, TimedEvent};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;

/// Default number of retained notifications
pub const DEFAULT_CAP: usize = 20;

/// Bounded, newest-first log of received updates
#[derive(Clone)]
pub struct NotificationFeed {
    inner: Arc<RwLock<FeedState>>,
    cap: usize,
}

struct FeedState {
    entries: VecDeque<TimedEvent>,
    unread: usize,
}

impl NotificationFeed {
    pub fn new(cap: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(FeedState {
                entries: VecDeque::with_capacity(cap),
                unread: 0,
            })),
            cap: cap.max(1),
        }
    }

    /// Record an update stamped with the current time
    pub fn push(&self, event: TicketUpdateEvent) -> TimedEvent {
        let timed = TimedEvent::now(event);
        let mut state = self.inner.write();
        state.entries.push_front(timed.clone());
        state.entries.truncate(self.cap);
        state.unread = (state.unread + 1).min(self.cap);
        timed
    }

    /// Newest first
    pub fn entries(&self) -> Vec<TimedEvent> {
        self.inner.read().entries.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<TimedEvent> {
        self.inner.read().entries.front().cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Entries received since the last `mark_all_read`
    pub fn unread(&self) -> usize {
        self.inner.read().unread
    }

    pub fn mark_all_read(&self) {
        self.inner.write().unread = 0;
    }
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAP)
    }
}
