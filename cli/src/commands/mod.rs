//! CLI Commands

pub mod config;
pub mod events;
pub mod tickets;
pub mod watch;

use std::time::Duration;

/// Resolves on Ctrl-C, or never if the signal cannot be installed
pub async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Redraw period while any row is highlighted
pub const REDRAW: Duration = Duration::from_millis(250);
