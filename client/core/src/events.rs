//! Ticket update events
//!
//! The push channel carries small JSON records. Only `ticket_update` records are
//! acted on; every other `type` (including the server's `connected` greeting) is
//! filtered out without being treated as an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event kind the client reacts to
pub const TICKET_UPDATE: &str = "ticket_update";

/// A ticket changed on the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketUpdateEvent {
    /// Ticket identifier, matched against locally held rows
    pub ticket_id: String,
    /// New lifecycle status, an opaque server-defined token
    pub status: String,
    /// Assigned manager name, only when the assignment changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
}

impl TicketUpdateEvent {
    pub fn new(ticket_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            status: status.into(),
            manager: None,
        }
    }

    pub fn with_manager(mut self, manager: impl Into<String>) -> Self {
        self.manager = Some(manager.into());
        self
    }
}

/// Result of decoding one raw push message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A recognized ticket update
    Update(TicketUpdateEvent),
    /// Well-formed message of a kind the client does not handle
    Ignored { kind: String },
    /// Payload that could not be understood
    Malformed { reason: String },
}

impl Decoded {
    pub fn into_update(self) -> Option<TicketUpdateEvent> {
        match self {
            Decoded::Update(event) => Some(event),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    kind: Option<serde_json::Value>,
    ticket_id: Option<serde_json::Value>,
    status: Option<serde_json::Value>,
    manager: Option<serde_json::Value>,
}

/// Decode a push message payload
pub fn decode(payload: &str) -> Decoded {
    let raw: RawMessage = match serde_json::from_str(payload) {
        Ok(raw) => raw,
        Err(e) => return Decoded::Malformed { reason: e.to_string() },
    };

    let kind = match raw.kind {
        Some(serde_json::Value::String(kind)) => kind,
        _ => return Decoded::Malformed { reason: "missing string `type`".into() },
    };
    if kind != TICKET_UPDATE {
        return Decoded::Ignored { kind };
    }

    let ticket_id = match raw.ticket_id {
        Some(serde_json::Value::String(id)) if !id.is_empty() => id,
        _ => return Decoded::Malformed { reason: "missing `ticket_id`".into() },
    };
    let status = match raw.status {
        Some(serde_json::Value::String(status)) => status,
        _ => return Decoded::Malformed { reason: "missing `status`".into() },
    };
    let manager = match raw.manager {
        Some(serde_json::Value::String(name)) if !name.is_empty() => Some(name),
        _ => None,
    };

    Decoded::Update(TicketUpdateEvent { ticket_id, status, manager })
}

/// Ticket update stamped with the local receipt time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub event: TicketUpdateEvent,
    /// Wall clock at receipt, not a server timestamp
    pub received_at: DateTime<Utc>,
}

impl TimedEvent {
    pub fn now(event: TicketUpdateEvent) -> Self {
        Self {
            event,
            received_at: Utc::now(),
        }
    }
}
