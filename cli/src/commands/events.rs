//! Notification tail

use super::interrupted;
use crate::output::{print_event, OutputFormat};
use ticket_live::{LiveClient, TimedEvent};
use tokio::sync::mpsc;

pub async fn handle(client: &LiveClient, limit: Option<usize>, format: OutputFormat) -> anyhow::Result<()> {
    let feed = client.start_notifications();
    if format.is_table() {
        for timed in feed.entries().iter().rev() {
            print_event(timed);
        }
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<TimedEvent>();
    let _subscription = client.stream().subscribe(move |event| {
        let _ = tx.send(TimedEvent::now(event.clone()));
    });
    let stop = interrupted();
    tokio::pin!(stop);

    let mut seen = 0;
    loop {
        tokio::select! {
            next = rx.recv() => {
                let Some(timed) = next else { break };
                if format.is_table() {
                    print_event(&timed);
                } else {
                    format.print_line(&timed);
                }
                feed.mark_all_read();
                seen += 1;
                if limit.map_or(false, |n| seen >= n) {
                    break;
                }
            }
            _ = &mut stop => break,
        }
    }
    Ok(())
}
