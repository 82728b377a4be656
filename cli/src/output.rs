//! Output formatting

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use ticket_live::{Ticket, TicketWithDetails, TimedEvent};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn print<T: Serialize>(&self, data: &T) {
        match self {
            OutputFormat::Json | OutputFormat::Table => {
                println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
            }
            OutputFormat::Yaml => {
                println!("{}", serde_yaml::to_string(data).unwrap_or_default());
            }
        }
    }

    /// One compact line per value, for streams
    pub fn print_line<T: Serialize>(&self, data: &T) {
        match self {
            OutputFormat::Yaml => {
                println!("---\n{}", serde_yaml::to_string(data).unwrap_or_default());
            }
            _ => println!("{}", serde_json::to_string(data).unwrap_or_default()),
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self, OutputFormat::Table)
    }
}

#[derive(Tabled)]
pub struct TicketRow {
    #[tabled(rename = "")]
    pub marker: &'static str,
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Subject")]
    pub subject: String,
    #[tabled(rename = "Client")]
    pub client: String,
    #[tabled(rename = "Segment")]
    pub segment: String,
    #[tabled(rename = "Manager")]
    pub manager: String,
}

impl TicketRow {
    pub fn new(ticket: &Ticket, highlighted: bool) -> Self {
        Self {
            marker: if highlighted { "●" } else { "" },
            id: ticket.label(),
            status: ticket.status.clone(),
            subject: truncate(&ticket.subject, 48),
            client: ticket.client_name.clone().unwrap_or_default(),
            segment: ticket.client_segment.clone().unwrap_or_default(),
            manager: ticket.manager.clone().unwrap_or_else(|| "-".into()),
        }
    }
}

pub fn ticket_table(rows: Vec<TicketRow>) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Human-readable detail block
pub fn print_detail(record: &TicketWithDetails) {
    let t = &record.ticket;
    println!("{} {} ({})", "Ticket".bold(), t.label(), t.id);
    println!("  Status:   {}", status_colour(&t.status));
    println!("  Subject:  {}", t.subject);
    if let Some(client) = &t.client_name {
        println!("  Client:   {} ({})", client, t.client_segment.as_deref().unwrap_or("-"));
    }
    if let Some(channel) = &t.source_channel {
        println!("  Channel:  {}", channel);
    }
    if let Some(address) = &t.raw_address {
        println!("  Address:  {}", address);
    }
    if let Some(city) = &record.geo_city {
        match record.distance_km {
            Some(km) => println!("  Office:   {} ({:.1} km)", city, km),
            None => println!("  Office:   {}", city),
        }
    }
    if !t.body.is_empty() {
        println!("\n{}", t.body);
    }

    match &record.ai {
        Some(ai) => {
            println!("\n{}", "AI analysis".bold());
            println!("  Type:      {}", ai.ticket_type.as_deref().unwrap_or("-"));
            println!("  Sentiment: {}", ai.sentiment.as_deref().unwrap_or("-"));
            println!("  Language:  {}", ai.lang);
            if let Some(summary) = &ai.summary {
                println!("  Summary:   {}", summary);
            }
            for action in ai.recommended_actions.iter().flatten() {
                println!("    - {}", action);
            }
        }
        None => println!("\n{}", "Not enriched yet".dimmed()),
    }

    if let Some(manager) = &record.assigned_manager {
        println!("\n{}", "Assignment".bold());
        println!("  Manager:   {}", manager.full_name);
        if let Some(office) = &manager.office_name {
            println!("  Office:    {}", office);
        }
        if let Some(reason) = record.assignment.as_ref().and_then(|a| a.routing_reason.as_ref()) {
            println!("  Reason:    {}", reason);
        }
    }

    if !record.audit_trail.is_empty() {
        println!("\n{}", "Audit trail".bold());
        for entry in &record.audit_trail {
            let at = entry
                .created_at
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_default();
            println!("  {} {:<12} {}", at.dimmed(), entry.step, entry.decision);
        }
    }
}

pub fn print_event(timed: &TimedEvent) {
    let e = &timed.event;
    let at = timed.received_at.with_timezone(&chrono::Local).format("%H:%M:%S");
    match &e.manager {
        Some(manager) => println!(
            "{} {} → {}  ({})",
            at.to_string().dimmed(),
            short_id(&e.ticket_id),
            status_colour(&e.status),
            manager
        ),
        None => println!(
            "{} {} → {}",
            at.to_string().dimmed(),
            short_id(&e.ticket_id),
            status_colour(&e.status)
        ),
    }
}

pub fn status_colour(status: &str) -> colored::ColoredString {
    match status {
        "new" => status.cyan(),
        "enriching" | "enriched" => status.blue(),
        "routed" | "open" => status.yellow(),
        "progress" => status.magenta(),
        "resolved" | "closed" => status.green(),
        _ => status.normal(),
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
