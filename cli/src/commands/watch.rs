//! Live ticket list

use super::{interrupted, REDRAW};
use crate::output::{ticket_table, OutputFormat, TicketRow};
use colored::Colorize;
use ticket_live::{ConnectionState, ListQuery, LiveClient, TicketList};

pub async fn handle(client: &LiveClient, query: ListQuery, format: OutputFormat) -> anyhow::Result<()> {
    let view = client.mount_list(query).await;
    let list = view.list();
    let mut changes = list.subscribe_changes();
    let mut redraw = tokio::time::interval(REDRAW);
    let stop = interrupted();
    tokio::pin!(stop);

    let mut highlighted = sorted_highlights(list);
    render(client, list, format);

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                highlighted = sorted_highlights(list);
                render(client, list, format);
            }
            _ = redraw.tick(), if format.is_table() => {
                // Highlights expire on their own; redraw when the set shrinks.
                let now = sorted_highlights(list);
                if now != highlighted {
                    highlighted = now;
                    render(client, list, format);
                }
            }
            _ = &mut stop => break,
        }
    }

    tracing::info!("Stopped watching");
    Ok(())
}

fn sorted_highlights(list: &TicketList) -> Vec<String> {
    let mut ids = list.highlights().ids();
    ids.sort();
    ids
}

fn render(client: &LiveClient, list: &TicketList, format: OutputFormat) {
    if !format.is_table() {
        format.print_line(&list.rows());
        return;
    }

    let rows: Vec<TicketRow> = list
        .rows()
        .iter()
        .map(|t| TicketRow::new(t, list.is_highlighted(&t.id)))
        .collect();
    let pages = list.pagination();
    let state = match client.stream().state() {
        ConnectionState::Connected => "live".green(),
        ConnectionState::Connecting | ConnectionState::Reconnecting => "reconnecting".yellow(),
        ConnectionState::Idle => "offline".red(),
    };

    // Clear screen and home the cursor.
    print!("\x1B[2J\x1B[H");
    println!(
        "{}  page {}/{}  {} tickets  stream: {}  updates: {}",
        "Tickets".bold(),
        pages.page,
        pages.total_pages.max(1),
        pages.total,
        state,
        client.notifications().unread()
    );
    if rows.is_empty() {
        println!("{}", "No tickets".dimmed());
    } else {
        println!("{}", ticket_table(rows));
    }
    println!("{}", "Ctrl-C to quit".dimmed());
}
