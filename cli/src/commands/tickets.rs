//! Ticket commands

use super::interrupted;
use crate::output::{print_detail, status_colour, OutputFormat};
use crate::KNOWN_STATUSES;
use anyhow::{anyhow, bail};
use colored::Colorize;
use std::time::Duration;
use ticket_live::{DetailState, LiveClient, TicketDetail, TicketList};

pub async fn show(client: &LiveClient, id: &str, follow: bool, format: OutputFormat) -> anyhow::Result<()> {
    if !follow {
        let record = client
            .api()
            .ticket_detail(id)
            .await?
            .ok_or_else(|| anyhow!("Ticket {} not found", id))?;
        if format.is_table() {
            print_detail(&record);
        } else {
            format.print(&record);
        }
        return Ok(());
    }

    let view = client.mount_detail(id).await;
    let detail = view.detail();
    let mut changes = detail.subscribe_changes();
    let stop = interrupted();
    tokio::pin!(stop);

    render(detail, format);
    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                render(detail, format);
            }
            _ = &mut stop => break,
        }
    }
    Ok(())
}

fn render(detail: &TicketDetail, format: OutputFormat) {
    match detail.state() {
        DetailState::Loading => {
            if format.is_table() {
                println!("{}", "Loading...".dimmed());
            }
        }
        DetailState::NotFound => println!("Ticket {} not found", detail.ticket_id()),
        DetailState::Loaded(record) => {
            if format.is_table() {
                print!("\x1B[2J\x1B[H");
                print_detail(&record);
                if detail.is_enriching() {
                    println!("\n{}", "Enrichment requested...".dimmed());
                }
            } else {
                format.print_line(&record);
            }
        }
    }
}

pub async fn set_status(client: &LiveClient, id: &str, status: &str, format: OutputFormat) -> anyhow::Result<()> {
    if !KNOWN_STATUSES.contains(&status) {
        eprintln!(
            "{} '{}' is not one of: {}",
            "warning:".yellow(),
            status,
            KNOWN_STATUSES.join(", ")
        );
    }

    let detail = TicketDetail::new(client.api().clone(), id, client.config().enrich_settle());
    detail.set_status(status).await?;

    match detail.record() {
        Some(record) if format.is_table() => {
            println!("Ticket {} is now {}", record.ticket.label(), status_colour(&record.ticket.status));
        }
        Some(record) => format.print(&record),
        None => bail!("Ticket {} not found after update", id),
    }
    Ok(())
}

pub async fn enrich(client: &LiveClient, id: &str, format: OutputFormat) -> anyhow::Result<()> {
    let settle = client.config().enrich_settle();
    let detail = TicketDetail::new(client.api().clone(), id, settle);
    detail.enrich().await?;
    if format.is_table() {
        println!("Enrichment requested for {}, waiting {} ms...", id, settle.as_millis());
    }

    // The delayed reload runs once the settle delay passes.
    let mut changes = detail.subscribe_changes();
    changes.borrow_and_update();
    let _ = tokio::time::timeout(settle + Duration::from_secs(5), changes.changed()).await;

    match detail.record() {
        Some(record) if format.is_table() => {
            if record.ai.is_some() {
                print_detail(&record);
            } else {
                println!("{}", "Enrichment still running; run `show` again shortly".dimmed());
            }
        }
        Some(record) => format.print(&record),
        None => bail!("Ticket {} not found", id),
    }
    Ok(())
}

pub async fn enrich_all(client: &LiveClient, format: OutputFormat) -> anyhow::Result<()> {
    let list = TicketList::new(
        client.api().clone(),
        client.default_query(),
        client.config().highlight_window(),
        client.config().enrich_settle(),
    );
    let summary = list.enrich_all().await?;
    list.unmount();

    if !format.is_table() {
        format.print(&summary);
        return Ok(());
    }
    println!(
        "Enrichment triggered for {}/{} tickets",
        summary.triggered.to_string().green(),
        summary.total
    );
    for error in &summary.errors {
        println!("  {} {}", "✗".red(), error);
    }
    Ok(())
}
