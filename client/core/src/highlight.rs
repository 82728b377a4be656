//! Highlight Set
//!
//! Transient "just changed" markers. Every mark keeps an id highlighted for a
//! full window from the moment of marking; a re-mark extends, never shortens.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;

/// Time-bounded set of recently changed ticket ids
#[derive(Clone)]
pub struct HighlightSet {
    window: Duration,
    deadlines: Arc<Mutex<HashMap<String, Instant>>>,
}

impl HighlightSet {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadlines: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Highlight `id` for one window from now
    ///
    /// Schedules the removal on the current Tokio runtime.
    pub fn mark(&self, id: &str) {
        let deadline = Instant::now() + self.window;
        {
            let mut deadlines = self.deadlines.lock();
            let entry = deadlines.entry(id.to_string()).or_insert(deadline);
            if *entry < deadline {
                *entry = deadline;
            }
        }

        let deadlines = Arc::downgrade(&self.deadlines);
        let id = id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            prune(&deadlines, &id);
        });
    }

    pub fn contains(&self, id: &str) -> bool {
        let now = Instant::now();
        self.deadlines
            .lock()
            .get(id)
            .map_or(false, |deadline| *deadline > now)
    }

    /// Currently highlighted ids, unordered
    pub fn ids(&self) -> Vec<String> {
        let now = Instant::now();
        self.deadlines
            .lock()
            .iter()
            .filter(|(_, deadline)| **deadline > now)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.deadlines.lock().clear();
    }
}

fn prune(deadlines: &Weak<Mutex<HashMap<String, Instant>>>, id: &str) {
    let Some(deadlines) = deadlines.upgrade() else {
        return;
    };
    let now = Instant::now();
    let mut deadlines = deadlines.lock();
    if deadlines.get(id).map_or(false, |deadline| *deadline <= now) {
        deadlines.remove(id);
    }
}
