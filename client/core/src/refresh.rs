//! Polling Fallback
//!
//! Periodic full reload that runs next to the event stream. The stream only
//! shortens staleness; this timer is what bounds it.

use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Something that can reload itself from the authoritative source
#[async_trait]
pub trait Refresh: Send + Sync {
    async fn refresh(&self) -> Result<()>;
}

/// Running refresh timer; stops on drop
pub struct PollingFallback {
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl PollingFallback {
    /// Start refreshing `target` every `interval`
    ///
    /// The first refresh happens one interval from now.
    pub fn spawn(target: Arc<dyn Refresh>, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(e) = target.refresh().await {
                    tracing::warn!("Periodic refresh failed: {}", e);
                }
            }
        });

        Self {
            handle: Some(handle),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for PollingFallback {
    fn drop(&mut self) {
        self.stop();
    }
}
