//! RepairDesk REST client.
//!
//! GET responses are kept in a shared [`ResponseCache`] with a TTL chosen
//! per resource. Requests that never reached the server are retried with a
//! short backoff.

use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::error::RepairDeskError;
use crate::tickets::{TicketId, TicketStore};

pub const TICKET_TTL: Duration = Duration::from_secs(90);
pub const EMPLOYEE_TTL: Duration = Duration::from_secs(1800);
pub const DEFAULT_TTL: Duration = Duration::from_secs(180);
/// Detail files younger than this are not rewritten by a refresh.
pub const DETAIL_MAX_AGE: Duration = Duration::from_secs(3600);

const MAX_RETRIES: u32 = 2;
const RETRY_DELAY: Duration = Duration::from_millis(500);
const RETRY_BACKOFF: f64 = 1.2;
const PAGE_LIMIT: u32 = 100;
const MAX_PAGES: u64 = 1000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub tickets: usize,
    pub details_written: usize,
    pub details_skipped: usize,
}

#[derive(Clone)]
pub struct RepairDeskClient {
    client: Client,
    api_key: String,
    base_url: String,
    cache: Arc<ResponseCache>,
    retry_delay: Duration,
}

impl RepairDeskClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration, cache: Arc<ResponseCache>) -> Self {
        Self {
            client: crate::ai::http_client(timeout),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            cache,
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn from_config(config: &Config, cache: Arc<ResponseCache>) -> Result<Self, RepairDeskError> {
        let api_key = config.repairdesk_key().ok_or(RepairDeskError::MissingKey)?;
        Ok(Self::new(
            api_key,
            &config.endpoints.repairdesk,
            Duration::from_secs(config.request_timeout_secs),
            cache,
        ))
    }

    /// Initial delay between retries; grows by 1.2x per attempt.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send_get(&self, path: &str, params: &[(&str, String)]) -> Result<Value, RepairDeskError> {
        let response = self
            .client
            .get(self.url(path))
            .query(&[("api_key", self.api_key.as_str())])
            .query(params)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(RepairDeskError::Status { status: status.as_u16(), body: text });
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn get_json(
        &self,
        path: &str,
        params: &[(&str, String)],
        ttl: Option<Duration>,
    ) -> Result<Value, RepairDeskError> {
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let cache_key = format!("GET:{}?{}", path, query);

        if let Some(ttl) = ttl {
            if let Some(cached) = self.cache.get(&cache_key, ttl) {
                debug!("Using cached RepairDesk response for {}", cache_key);
                return Ok(cached);
            }
        }

        let mut delay = self.retry_delay;
        let mut attempt = 0;
        let value = loop {
            info!("[RepairDeskClient] GET {}", self.url(path));
            match self.send_get(path, params).await {
                Ok(value) => break value,
                Err(e) if e.is_transient() && attempt < MAX_RETRIES => {
                    attempt += 1;
                    warn!("RepairDesk call failed (attempt {}/{}): {}", attempt, MAX_RETRIES + 1, e);
                    tokio::time::sleep(delay).await;
                    delay = delay.mul_f64(RETRY_BACKOFF);
                }
                Err(e) => {
                    error!("RepairDesk GET {} failed: {}", path, e);
                    return Err(e);
                }
            }
        };

        if ttl.is_some() {
            self.cache.insert(cache_key, value.clone());
        }
        Ok(value)
    }

    pub async fn get_tickets(&self, page: u64) -> Result<Value, RepairDeskError> {
        let params = [("page", page.to_string()), ("limit", PAGE_LIMIT.to_string())];
        self.get_json("tickets", &params, Some(TICKET_TTL)).await
    }

    /// Every ticket across all pages. `force_refresh` bypasses cached pages.
    pub async fn get_all_tickets(&self, force_refresh: bool) -> Result<Vec<Value>, RepairDeskError> {
        if force_refresh {
            self.cache.invalidate_prefix("GET:tickets?");
        }

        let mut tickets = Vec::new();
        let mut page = 1;
        loop {
            let response = self.get_tickets(page).await?;
            let data = response.get("data").unwrap_or(&Value::Null);
            let batch = ticket_batch(data);
            debug!("Fetched {} tickets from page {}", batch.len(), page);
            tickets.extend(batch);

            let pagination = data
                .get("pagination")
                .or_else(|| response.get("pagination"))
                .unwrap_or(&Value::Null);
            if !is_truthy(pagination.get("next_page_exist")) {
                break;
            }
            let next = pagination
                .get("next_page")
                .and_then(as_u64)
                .unwrap_or(page + 1);
            if next <= page || next > MAX_PAGES {
                warn!("Stopping pagination at page {} (next page {})", page, next);
                break;
            }
            page = next;
        }

        info!("Successfully retrieved {} tickets from API", tickets.len());
        Ok(tickets)
    }

    pub async fn get_employees(&self) -> Result<Value, RepairDeskError> {
        self.get_json("employees", &[], Some(EMPLOYEE_TTL)).await
    }

    pub async fn get_customers(&self, page: u64) -> Result<Value, RepairDeskError> {
        let params = [("page", page.to_string()), ("limit", PAGE_LIMIT.to_string())];
        self.get_json("customers", &params, Some(DEFAULT_TTL)).await
    }

    pub async fn get_inventory(&self, page: u64) -> Result<Value, RepairDeskError> {
        let params = [("page", page.to_string()), ("limit", PAGE_LIMIT.to_string())];
        self.get_json("inventory", &params, Some(DEFAULT_TTL)).await
    }

    /// One ticket by its internal API id (digits only). Never cached.
    pub async fn get_ticket_by_id(&self, api_id: &str) -> Result<Value, RepairDeskError> {
        let api_id = api_id.trim().trim_start_matches("T-");
        let data = self.get_json(&format!("tickets/{}", api_id), &[], None).await?;
        let not_found = data.get("success") == Some(&Value::Bool(false))
            || data.get("statusCode").and_then(as_u64) == Some(404);
        if not_found {
            let message = data.get("message").and_then(Value::as_str).unwrap_or("No details provided");
            info!("Ticket not found for ID {}: {}", api_id, message);
            return Err(RepairDeskError::TicketNotFound(api_id.to_string()));
        }
        info!("Ticket details fetched successfully for ID {}", api_id);
        Ok(data)
    }

    /// Post a note on a ticket. `note_type` is 0 (internal) or 1
    /// (diagnostic); anything else is sent as 1.
    pub async fn add_note(
        &self,
        ticket_id: &str,
        note: &str,
        note_type: i64,
        is_flag: bool,
    ) -> Result<Value, RepairDeskError> {
        let note_type = if note_type == 0 || note_type == 1 { note_type } else { 1 };
        let payload = json!({
            "id": ticket_id,
            "note": note,
            "type": note_type,
            "is_flag": if is_flag { 1 } else { 0 },
        });

        info!("[RepairDeskClient] Adding note to ticket {}", ticket_id);
        let response = self
            .client
            .post(self.url("ticket/addnote"))
            .query(&[("api_key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let body: Value = serde_json::from_str(&text).map_err(|e| {
            error!("Invalid JSON response when adding note: {}", text);
            RepairDeskError::Json(e)
        })?;

        if status.is_success() && is_truthy(body.get("success")) {
            self.cache.invalidate_prefix("GET:tickets");
            info!("Note added successfully to ticket {}", ticket_id);
            return Ok(body);
        }
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string();
        error!("Error adding note to ticket {}: {}", ticket_id, message);
        if status.is_success() {
            Err(RepairDeskError::Rejected(message))
        } else {
            Err(RepairDeskError::Status { status: status.as_u16(), body: text })
        }
    }

    /// Fetch every ticket, rewrite the ticket cache and the per-ticket
    /// detail files that are older than an hour.
    pub async fn refresh_ticket_cache(
        &self,
        store: &TicketStore,
        force_refresh: bool,
    ) -> anyhow::Result<RefreshSummary> {
        let tickets = self.get_all_tickets(force_refresh).await?;
        store.write_cache(&tickets)?;

        let mut summary = RefreshSummary { tickets: tickets.len(), ..RefreshSummary::default() };
        for ticket in &tickets {
            let order_id = ticket
                .get("summary")
                .and_then(|s| s.get("order_id"))
                .map(crate::lenient::value_to_string)
                .unwrap_or_default();
            let Ok(id) = TicketId::parse(&order_id) else {
                warn!("Skipping ticket with missing or invalid order_id: {:?}", order_id);
                summary.details_skipped += 1;
                continue;
            };

            if store.detail_is_fresh(&id, DETAIL_MAX_AGE) {
                debug!("Skipping recent ticket detail file for {}", id);
                summary.details_skipped += 1;
                continue;
            }
            match store.write_detail(&id, ticket) {
                Ok(_) => summary.details_written += 1,
                Err(e) => {
                    error!("Could not write ticket detail file for {}: {}", id, e);
                    summary.details_skipped += 1;
                }
            }
        }

        info!(
            "Refreshed {} tickets: {} detail files written, {} skipped",
            summary.tickets, summary.details_written, summary.details_skipped
        );
        Ok(summary)
    }
}

/// `ticketData` comes either as a list or as a map keyed by position.
fn ticket_batch(data: &Value) -> Vec<Value> {
    let raw: Vec<&Value> = match data.get("ticketData") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Object(map)) => map.values().collect(),
        _ => match data {
            Value::Array(items) => items.iter().collect(),
            _ => Vec::new(),
        },
    };
    raw.into_iter()
        .filter(|t| {
            let ok = t.is_object();
            if !ok {
                warn!("Skipping non-object ticket entry");
            }
            ok
        })
        .cloned()
        .collect()
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => matches!(s.trim(), "1" | "true"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, cache: Arc<ResponseCache>) -> RepairDeskClient {
        RepairDeskClient::new("rd-key", &server.uri(), Duration::from_secs(5), cache)
            .with_retry_delay(Duration::from_millis(10))
    }

    fn manual_cache() -> (Arc<ResponseCache>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (Arc::new(ResponseCache::new(clock.clone())), clock)
    }

    fn ticket(id: u64, order_id: &str) -> Value {
        json!({"summary": {"id": id, "order_id": order_id}})
    }

    #[tokio::test]
    async fn test_all_tickets_follows_pagination() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tickets"))
            .and(query_param("page", "1"))
            .and(query_param("api_key", "rd-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "ticketData": [ticket(1, "T-1"), ticket(2, "T-2")],
                    "pagination": {"next_page_exist": 1, "next_page": 2}
                }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tickets"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "ticketData": {"0": ticket(3, "T-3"), "1": "pagination"},
                    "pagination": {"next_page_exist": 0}
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (cache, _) = manual_cache();
        let tickets = client(&server, cache).get_all_tickets(false).await.unwrap();
        assert_eq!(tickets.len(), 3);
        assert_eq!(tickets[2]["summary"]["order_id"], "T-3");
    }

    #[tokio::test]
    async fn test_ticket_pages_cached_for_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tickets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"ticketData": []}})))
            .expect(2)
            .mount(&server)
            .await;

        let (cache, clock) = manual_cache();
        let rd = client(&server, cache);
        rd.get_tickets(1).await.unwrap();
        clock.advance(Duration::from_secs(60));
        rd.get_tickets(1).await.unwrap();
        clock.advance(Duration::from_secs(31));
        rd.get_tickets(1).await.unwrap();
    }

    #[tokio::test]
    async fn test_employees_use_longer_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/employees"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(1)
            .mount(&server)
            .await;

        let (cache, clock) = manual_cache();
        let rd = client(&server, cache);
        rd.get_employees().await.unwrap();
        clock.advance(Duration::from_secs(1799));
        rd.get_employees().await.unwrap();
    }

    #[tokio::test]
    async fn test_timeouts_are_retried_twice() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/inventory"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .expect(3)
            .mount(&server)
            .await;

        let (cache, _) = manual_cache();
        let rd = RepairDeskClient::new("rd-key", &server.uri(), Duration::from_millis(100), cache)
            .with_retry_delay(Duration::from_millis(10));
        assert!(matches!(rd.get_inventory(1).await, Err(RepairDeskError::Timeout)));
    }

    #[tokio::test]
    async fn test_status_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let (cache, _) = manual_cache();
        let result = client(&server, cache).get_customers(1).await;
        assert!(matches!(result, Err(RepairDeskError::Status { status: 401, .. })));
    }

    #[tokio::test]
    async fn test_ticket_by_id_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tickets/404"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false, "statusCode": 404, "message": "Ticket not found"
            })))
            .mount(&server)
            .await;

        let (cache, _) = manual_cache();
        let result = client(&server, cache).get_ticket_by_id("T-404").await;
        assert!(matches!(result, Err(RepairDeskError::TicketNotFound(id)) if id == "404"));
    }

    #[tokio::test]
    async fn test_add_note_coerces_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ticket/addnote"))
            .and(query_param("api_key", "rd-key"))
            .and(body_partial_json(json!({"id": "99812", "note": "Called customer", "type": 1, "is_flag": 0})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let (cache, _) = manual_cache();
        let reply = client(&server, cache)
            .add_note("99812", "Called customer", 7, false)
            .await
            .unwrap();
        assert_eq!(reply["success"], true);
    }

    #[tokio::test]
    async fn test_add_note_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false, "message": "Invalid ticket"
            })))
            .mount(&server)
            .await;

        let (cache, _) = manual_cache();
        let result = client(&server, cache).add_note("1", "x", 0, true).await;
        assert!(matches!(result, Err(RepairDeskError::Rejected(m)) if m == "Invalid ticket"));
    }

    #[tokio::test]
    async fn test_refresh_writes_cache_and_skips_fresh_details() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tickets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"ticketData": [ticket(1, "T-1"), ticket(2, "T-2"), ticket(3, "")]}
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let store = TicketStore::new(dir.path());
        store
            .write_detail(&TicketId::parse("T-2").unwrap(), &ticket(2, "T-2"))
            .unwrap();

        let (cache, _) = manual_cache();
        let summary = client(&server, cache)
            .refresh_ticket_cache(&store, true)
            .await
            .unwrap();
        assert_eq!(
            summary,
            RefreshSummary { tickets: 3, details_written: 1, details_skipped: 2 }
        );
        assert_eq!(store.load_tickets(false).len(), 3);
        assert!(dir.path().join("ticket_detail_T-1.json").exists());
    }

    #[test]
    fn test_truthy_values() {
        assert!(is_truthy(Some(&json!(1))));
        assert!(is_truthy(Some(&json!(true))));
        assert!(is_truthy(Some(&json!("1"))));
        assert!(!is_truthy(Some(&json!(0))));
        assert!(!is_truthy(None));
    }
}
