//! Event Fan-out Hook
//!
//! Lets a view attach to the shared stream once and swap its callback as often
//! as it likes. Dispatch always reads through the hook's own cell, so the
//! subscription never has to be recreated for a new callback.

use crate::events::TicketUpdateEvent;
use crate::stream::{EventCallback, EventStream, Subscription};
use parking_lot::RwLock;
use std::sync::Arc;

/// Per-view stream attachment
pub struct EventHook {
    latest: Arc<RwLock<EventCallback>>,
    subscription: Option<Subscription>,
}

impl EventHook {
    /// Attach to `stream`, subscribing exactly once
    pub fn mount<F>(stream: &EventStream, on_event: F) -> Self
    where
        F: Fn(&TicketUpdateEvent) + Send + Sync + 'static,
    {
        let latest: Arc<RwLock<EventCallback>> = Arc::new(RwLock::new(Arc::new(on_event)));
        let cell = latest.clone();
        let subscription = stream.subscribe(move |event| {
            let current = cell.read().clone();
            current(event);
        });

        Self {
            latest,
            subscription: Some(subscription),
        }
    }

    /// Replace the callback; the next event goes to `on_event`
    pub fn set_callback<F>(&self, on_event: F)
    where
        F: Fn(&TicketUpdateEvent) + Send + Sync + 'static,
    {
        *self.latest.write() = Arc::new(on_event);
    }

    pub fn is_mounted(&self) -> bool {
        self.subscription
            .as_ref()
            .map_or(false, Subscription::is_active)
    }

    /// Detach from the stream
    pub fn unmount(&mut self) {
        self.subscription.take();
    }
}

impl Drop for EventHook {
    fn drop(&mut self) {
        self.unmount();
    }
}
