//! Ticket REST API
//!
//! Response shapes of the ticket backend and the `TicketApi` seam the
//! reconcilers fetch through.

use crate::{LiveError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// Models
// =============================================================================

/// Ticket as held by list views
///
/// Only `id` and `status` matter for reconciliation; everything else is
/// display data and may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub client_segment: Option<String>,
    #[serde(default)]
    pub source_channel: Option<String>,
    #[serde(default)]
    pub raw_address: Option<String>,
    #[serde(default)]
    pub attachments: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Manager name learned from live updates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
}

impl Ticket {
    pub fn new(id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: status.into(),
            ..Default::default()
        }
    }

    /// Short label: external id, or the first 8 chars of the id
    pub fn label(&self) -> String {
        match &self.external_id {
            Some(ext) if !ext.is_empty() => ext.clone(),
            _ => self.id.chars().take(8).collect(),
        }
    }
}

/// AI enrichment of a ticket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketAi {
    pub id: String,
    pub ticket_id: String,
    #[serde(rename = "type")]
    pub ticket_type: Option<String>,
    pub sentiment: Option<String>,
    pub priority_1_10: Option<u8>,
    pub lang: String,
    pub summary: Option<String>,
    pub recommended_actions: Option<Vec<String>>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub geo_status: String,
    pub confidence_type: Option<f64>,
    pub confidence_sentiment: Option<f64>,
    pub confidence_priority: Option<f64>,
    pub processing_ms: Option<u64>,
    pub enriched_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Current routing of a ticket to a manager
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketAssignment {
    pub id: String,
    pub ticket_id: String,
    pub manager_id: String,
    pub business_unit_id: String,
    pub assigned_at: Option<DateTime<Utc>>,
    pub routing_reason: Option<String>,
    pub is_current: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manager {
    pub id: String,
    pub full_name: String,
    pub email: Option<String>,
    pub business_unit_id: String,
    pub is_vip_skill: bool,
    pub is_chief_spec: bool,
    pub languages: Vec<String>,
    pub max_load: u32,
    pub current_load: u32,
    pub is_active: bool,
    pub office_name: Option<String>,
    pub office_city: Option<String>,
}

/// One step of the routing pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditLog {
    pub id: String,
    pub ticket_id: String,
    pub step: String,
    pub input_data: serde_json::Value,
    pub output_data: serde_json::Value,
    pub decision: String,
    pub candidates: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
}

/// Joined detail aggregate (`GET /tickets/{id}`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketWithDetails {
    pub ticket: Ticket,
    #[serde(default)]
    pub ai: Option<TicketAi>,
    #[serde(default)]
    pub assignment: Option<TicketAssignment>,
    #[serde(default)]
    pub assigned_manager: Option<Manager>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub audit_trail: Vec<AuditLog>,
    #[serde(default)]
    pub geo_city: Option<String>,
    #[serde(default)]
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u32,
}

/// One page of `GET /tickets`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketPage {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Vec<Ticket>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Result of `POST /tickets/enrich-all`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichAllSummary {
    pub total: u64,
    pub triggered: u64,
    pub errors: Vec<String>,
}

/// List filters (`GET /tickets` query)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub page: u32,
    pub per_page: u32,
    pub status: Option<String>,
    pub sentiment: Option<String>,
    #[serde(rename = "type")]
    pub ticket_type: Option<String>,
    pub segment: Option<String>,
    pub search: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
            status: None,
            sentiment: None,
            ticket_type: None,
            segment: None,
            search: None,
        }
    }
}

impl ListQuery {
    /// Query pairs with empty filters left out
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("page", self.page.to_string()),
            ("per_page", self.per_page.to_string()),
        ];
        let filters = [
            ("status", &self.status),
            ("sentiment", &self.sentiment),
            ("type", &self.ticket_type),
            ("segment", &self.segment),
            ("search", &self.search),
        ];
        for (key, value) in filters {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                pairs.push((key, value.to_string()));
            }
        }
        pairs
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// API seam
// =============================================================================

/// Authoritative ticket source
#[async_trait]
pub trait TicketApi: Send + Sync {
    async fn list_tickets(&self, query: &ListQuery) -> Result<TicketPage>;

    /// `Ok(None)` when the server has no such ticket
    async fn ticket_detail(&self, id: &str) -> Result<Option<TicketWithDetails>>;

    async fn update_status(&self, id: &str, status: &str) -> Result<()>;

    /// Trigger asynchronous enrichment of one ticket
    async fn enrich(&self, id: &str) -> Result<()>;

    /// Trigger enrichment of every `new` ticket
    async fn enrich_all(&self) -> Result<EnrichAllSummary>;
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP implementation of `TicketApi`
pub struct ApiClient {
    base_url: reqwest::Url,
    api_token: Option<String>,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str, api_token: Option<&str>, timeout: Duration) -> Result<Self> {
        let base_url = reqwest::Url::parse(base_url)
            .map_err(|e| LiveError::Config(format!("invalid api_url {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(LiveError::Config(format!("api_url {} cannot take a path", base_url)));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url,
            api_token: api_token.map(String::from),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Base URL plus `segments`, each percent-encoded as one path segment
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| LiveError::Config(format!("api_url {} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `/tickets/{id}[/{action}]`; the id is never altered, only encoded
    fn ticket_url(&self, id: &str, action: Option<&str>) -> Result<reqwest::Url> {
        // Url drops "." and ".." segments, which would leave the list endpoint.
        if id.is_empty() || id == "." || id == ".." {
            return Err(LiveError::Config(format!("invalid ticket id {:?}", id)));
        }
        match action {
            Some(action) => self.endpoint(&["tickets", id, action]),
            None => self.endpoint(&["tickets", id]),
        }
    }

    fn request(&self, method: reqwest::Method, url: reqwest::Url) -> reqwest::RequestBuilder {
        let mut req = self.client.request(method, url);
        if let Some(token) = &self.api_token {
            req = req.header(reqwest::header::AUTHORIZATION, format!("Bearer {}", token));
        }
        req
    }

    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<Envelope<serde_json::Value>>(&body)
                .ok()
                .and_then(|envelope| envelope.error)
                .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned());
            return Err(LiveError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send_data<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let envelope: Envelope<T> = self.send(req).await?;
        envelope
            .data
            .ok_or_else(|| LiveError::Transport("no data in response".into()))
    }
}

#[async_trait]
impl TicketApi for ApiClient {
    async fn list_tickets(&self, query: &ListQuery) -> Result<TicketPage> {
        let req = self
            .request(reqwest::Method::GET, self.endpoint(&["tickets"])?)
            .query(&query.to_pairs());
        self.send(req).await
    }

    async fn ticket_detail(&self, id: &str) -> Result<Option<TicketWithDetails>> {
        let req = self.request(reqwest::Method::GET, self.ticket_url(id, None)?);
        match self.send::<Envelope<TicketWithDetails>>(req).await {
            Ok(envelope) => Ok(envelope.data),
            Err(LiveError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn update_status(&self, id: &str, status: &str) -> Result<()> {
        let req = self
            .request(reqwest::Method::PATCH, self.ticket_url(id, Some("status"))?)
            .json(&serde_json::json!({ "status": status }));
        let _: serde_json::Value = self.send(req).await?;
        Ok(())
    }

    async fn enrich(&self, id: &str) -> Result<()> {
        let req = self.request(reqwest::Method::POST, self.ticket_url(id, Some("enrich"))?);
        let _: serde_json::Value = self.send(req).await?;
        Ok(())
    }

    async fn enrich_all(&self) -> Result<EnrichAllSummary> {
        let req = self.request(reqwest::Method::POST, self.endpoint(&["tickets", "enrich-all"])?);
        self.send_data(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Serve one canned HTTP response and hand back the raw request
    async fn serve_once(status_line: &str, body: &str) -> (String, tokio::sync::oneshot::Receiver<String>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/api/v1", listener.local_addr().unwrap());
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let _ = tx.send(request);
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        (base, rx)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut raw = Vec::new();
        let mut buf = [0u8; 2048];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&raw).into_owned();
            if let Some(head_end) = text.find("\r\n\r\n") {
                let content_length = text[..head_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if raw.len() >= head_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&raw).into_owned()
    }

    #[test]
    fn test_query_pairs_skip_empty_filters() {
        let query = ListQuery {
            status: Some("new".into()),
            search: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(
            query.to_pairs(),
            vec![
                ("page", "1".to_string()),
                ("per_page", "20".to_string()),
                ("status", "new".to_string()),
            ]
        );
    }

    #[test]
    fn test_partial_rows_and_null_arrays_deserialize() {
        let page: TicketPage = serde_json::from_str(
            r#"{"data":[{"id":"t1","status":"new"}],"pagination":{"page":1,"per_page":20,"total":1,"total_pages":1}}"#,
        )
        .unwrap();
        assert_eq!(page.data, vec![Ticket::new("t1", "new")]);

        let empty: TicketPage = serde_json::from_str(r#"{"data":null,"pagination":{"page":1,"per_page":20,"total":0,"total_pages":0}}"#).unwrap();
        assert!(empty.data.is_empty());
    }

    #[test]
    fn test_detail_aggregate_deserializes() {
        let detail: TicketWithDetails = serde_json::from_str(
            r#"{
                "ticket": {"id":"t1","status":"routed","subject":"Card blocked","created_at":"2025-02-01T10:00:00Z"},
                "ai": {"id":"a1","ticket_id":"t1","type":"Complaint","sentiment":"Negative","priority_1_10":8,"lang":"RU","geo_status":"ok"},
                "assignment": null,
                "assigned_manager": {"id":"m1","full_name":"Dana K.","languages":["RU","KZ"]},
                "audit_trail": null,
                "geo_city": "Astana",
                "distance_km": 12.5
            }"#,
        )
        .unwrap();
        assert_eq!(detail.ticket.subject, "Card blocked");
        assert_eq!(detail.ai.unwrap().priority_1_10, Some(8));
        assert!(detail.audit_trail.is_empty());
        assert_eq!(detail.assigned_manager.unwrap().languages.len(), 2);
        assert_eq!(detail.distance_km, Some(12.5));
    }

    #[test]
    fn test_label_prefers_external_id() {
        let mut t = Ticket::new("4f9d2c1e-0000-0000-0000-000000000000", "new");
        assert_eq!(t.label(), "4f9d2c1e");
        t.external_id = Some("EXT-77".into());
        assert_eq!(t.label(), "EXT-77");
    }

    #[tokio::test]
    async fn test_list_tickets_sends_query() {
        let (base, seen) = serve_once(
            "200 OK",
            r#"{"data":[{"id":"t1","status":"new"}],"pagination":{"page":2,"per_page":5,"total":6,"total_pages":2}}"#,
        )
        .await;
        let client = ApiClient::new(&base, Some("secret"), Duration::from_secs(5)).unwrap();
        let query = ListQuery {
            page: 2,
            per_page: 5,
            status: Some("new".into()),
            ..Default::default()
        };

        let page = client.list_tickets(&query).await.unwrap();
        assert_eq!(page.pagination.total_pages, 2);
        assert_eq!(page.data.len(), 1);

        let request = seen.await.unwrap();
        assert!(request.starts_with("GET /api/v1/tickets?page=2&per_page=5&status=new "));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer secret"));
    }

    #[tokio::test]
    async fn test_detail_not_found_is_none() {
        let (base, _seen) = serve_once("404 Not Found", r#"{"error":"ticket not found: no rows"}"#).await;
        let client = ApiClient::new(&base, None, Duration::from_secs(5)).unwrap();
        assert_eq!(client.ticket_detail("t404").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_error_envelope_becomes_status_error() {
        let (base, seen) = serve_once("500 Internal Server Error", r#"{"error":"db down"}"#).await;
        let client = ApiClient::new(&base, None, Duration::from_secs(5)).unwrap();

        let err = client.update_status("t1", "closed").await.unwrap_err();
        assert!(matches!(err, LiveError::Status { status: 500, ref message } if message == "db down"));

        let request = seen.await.unwrap();
        assert!(request.starts_with("PATCH /api/v1/tickets/t1/status "));
        assert!(request.ends_with(r#"{"status":"closed"}"#));
    }

    #[test]
    fn test_ticket_ids_are_encoded_not_rewritten() {
        let client = ApiClient::new("http://localhost:8080/api/v1/", None, Duration::from_secs(5)).unwrap();

        let dotted = client.ticket_url("t.1", None).unwrap();
        let plain = client.ticket_url("t1", None).unwrap();
        assert_ne!(dotted, plain);
        assert_eq!(dotted.path(), "/api/v1/tickets/t.1");

        let slashed = client.ticket_url("a/b", Some("status")).unwrap();
        assert_eq!(slashed.path(), "/api/v1/tickets/a%2Fb/status");

        let spaced = client.ticket_url("with space", Some("enrich")).unwrap();
        assert_eq!(spaced.path(), "/api/v1/tickets/with%20space/enrich");
    }

    #[test]
    fn test_empty_ticket_id_rejected() {
        let client = ApiClient::new("http://localhost:8080/api/v1", None, Duration::from_secs(5)).unwrap();
        for id in ["", ".", ".."] {
            assert!(matches!(client.ticket_url(id, None), Err(LiveError::Config(_))), "{:?}", id);
        }
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(matches!(
            ApiClient::new("not a url", None, Duration::from_secs(5)),
            Err(LiveError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_slash_in_id_stays_one_segment() {
        let (base, seen) = serve_once("200 OK", r#"{"data":{"id":"a/b","status":"closed"}}"#).await;
        let client = ApiClient::new(&base, None, Duration::from_secs(5)).unwrap();

        client.update_status("a/b", "closed").await.unwrap();

        let request = seen.await.unwrap();
        assert!(request.starts_with("PATCH /api/v1/tickets/a%2Fb/status "));
    }

    #[tokio::test]
    async fn test_enrich_all_reads_summary() {
        let (base, _seen) = serve_once("200 OK", r#"{"data":{"total":3,"triggered":2,"errors":["t3: timeout"]}}"#).await;
        let client = ApiClient::new(&base, None, Duration::from_secs(5)).unwrap();
        let summary = client.enrich_all().await.unwrap();
        assert_eq!(summary.triggered, 2);
        assert_eq!(summary.errors, vec!["t3: timeout".to_string()]);
    }
}
