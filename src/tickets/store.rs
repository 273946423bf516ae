//! On-disk ticket cache written by the RepairDesk poller.
//!
//! Layout of the cache directory:
//! - `ticket_cache.json`: every ticket, as an array or `{"items": [...]}`
//! - `specific_ticket.json`: optional ticket pinned to the front of the list
//! - `ticket_detail_T-<digits>.json`: one ticket, usually wrapped as
//!   `{"success": true, "data": {...}}`

use anyhow::{Result, anyhow};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use super::{Ticket, TicketId};

pub const TICKET_CACHE_FILE: &str = "ticket_cache.json";
pub const SPECIFIC_TICKET_FILE: &str = "specific_ticket.json";

#[derive(Debug, Clone)]
pub struct TicketStore {
    cache_dir: PathBuf,
}

impl TicketStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self { cache_dir: cache_dir.into() }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn detail_path(&self, id: &TicketId) -> PathBuf {
        self.cache_dir.join(id.detail_file_name())
    }

    /// Every cached ticket. A missing or unreadable cache is an empty list.
    pub fn load_tickets(&self, include_specific: bool) -> Vec<Ticket> {
        match self.try_load_tickets(include_specific) {
            Ok(tickets) => tickets,
            Err(e) => {
                warn!("Could not load ticket cache: {}", e);
                Vec::new()
            }
        }
    }

    fn try_load_tickets(&self, include_specific: bool) -> Result<Vec<Ticket>> {
        let cache_path = self.cache_dir.join(TICKET_CACHE_FILE);
        if !cache_path.exists() {
            debug!("No ticket cache at {:?}", cache_path);
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&cache_path)?;
        let cache_data: Value = serde_json::from_str(&content)?;

        let items = match &cache_data {
            Value::Array(items) => items.as_slice(),
            Value::Object(map) => match map.get("items") {
                Some(Value::Array(items)) => items.as_slice(),
                _ => return Err(anyhow!("ticket cache object has no 'items' array")),
            },
            _ => return Err(anyhow!("unexpected ticket cache structure")),
        };

        let mut tickets: Vec<Ticket> = items.iter().filter_map(Ticket::from_value).collect();
        if tickets.len() < items.len() {
            warn!("Skipped {} malformed tickets in cache", items.len() - tickets.len());
        }

        if include_specific {
            if let Some(specific) = self.load_specific_ticket() {
                if !specific.summary.id.is_empty() {
                    tickets.retain(|t| t.summary.id != specific.summary.id);
                }
                tickets.insert(0, specific);
            }
        }

        Ok(tickets)
    }

    fn load_specific_ticket(&self) -> Option<Ticket> {
        let path = self.cache_dir.join(SPECIFIC_TICKET_FILE);
        if !path.exists() {
            return None;
        }
        let value = read_json(&path)
            .map_err(|e| warn!("Could not read {:?}: {}", path, e))
            .ok()?;
        Ticket::from_value(unwrap_data(&value))
    }

    /// The raw detail record of a ticket, with the `data` wrapper removed.
    pub fn load_detail(&self, id: &TicketId) -> Result<Option<Value>> {
        let path = self.detail_path(id);
        if !path.exists() {
            debug!("Ticket detail file not found at {:?}", path);
            return Ok(None);
        }
        let value = read_json(&path)?;
        info!("Loaded ticket detail for {} from {:?}", id, path);
        Ok(Some(unwrap_data(&value).clone()))
    }

    pub fn find_ticket(&self, id: &TicketId) -> Option<Ticket> {
        self.load_tickets(false).into_iter().find(|t| t.matches(id))
    }

    pub fn write_cache(&self, tickets: &[Value]) -> Result<PathBuf> {
        fs::create_dir_all(&self.cache_dir)?;
        let path = self.cache_dir.join(TICKET_CACHE_FILE);
        let content = serde_json::to_string_pretty(&json!({ "items": tickets }))?;
        fs::write(&path, content)?;
        info!("Wrote {} tickets to {:?}", tickets.len(), path);
        Ok(path)
    }

    /// Store `data` as the detail record of `id`, in the same wrapper the
    /// API uses.
    pub fn write_detail(&self, id: &TicketId, data: &Value) -> Result<PathBuf> {
        fs::create_dir_all(&self.cache_dir)?;
        let path = self.detail_path(id);
        let wrapped = json!({
            "success": true,
            "data": unwrap_data(data),
            "processed_at": chrono::Local::now().to_rfc3339(),
        });
        fs::write(&path, serde_json::to_string_pretty(&wrapped)?)?;
        debug!("Saved ticket detail file {:?}", path);
        Ok(path)
    }

    /// Whether the detail file exists and is younger than `max_age`.
    pub fn detail_is_fresh(&self, id: &TicketId, max_age: Duration) -> bool {
        fs::metadata(self.detail_path(id))
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .map(|age| age < max_age)
            .unwrap_or(false)
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| anyhow!("Invalid JSON in {:?}: {}", path, e))
}

fn unwrap_data(value: &Value) -> &Value {
    match value.get("data") {
        Some(data) if data.is_object() => data,
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ticket(api_id: u64, order_id: &str) -> Value {
        json!({"summary": {"id": api_id, "order_id": order_id}})
    }

    #[test]
    fn test_missing_cache_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(TicketStore::new(dir.path()).load_tickets(true).is_empty());
    }

    #[test]
    fn test_loads_plain_array() {
        let dir = TempDir::new().unwrap();
        let body = json!([ticket(1, "T-10"), ticket(2, "T-11")]);
        fs::write(dir.path().join(TICKET_CACHE_FILE), body.to_string()).unwrap();
        let tickets = TicketStore::new(dir.path()).load_tickets(false);
        assert_eq!(tickets.len(), 2);
    }

    #[test]
    fn test_write_then_load_items_wrapper() {
        let dir = TempDir::new().unwrap();
        let store = TicketStore::new(dir.path());
        store.write_cache(&[ticket(1, "T-10")]).unwrap();
        let tickets = store.load_tickets(false);
        assert_eq!(tickets[0].summary.order_id, "T-10");
    }

    #[test]
    fn test_unparsable_cache_is_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(TICKET_CACHE_FILE), "{not json").unwrap();
        assert!(TicketStore::new(dir.path()).load_tickets(false).is_empty());
    }

    #[test]
    fn test_specific_ticket_moves_to_front() {
        let dir = TempDir::new().unwrap();
        let store = TicketStore::new(dir.path());
        store.write_cache(&[ticket(1, "T-10"), ticket(2, "T-11")]).unwrap();
        let specific = json!({"data": {"summary": {"id": 2, "order_id": "T-11"}, "notes": [{"msg_text": "hi"}]}});
        fs::write(dir.path().join(SPECIFIC_TICKET_FILE), specific.to_string()).unwrap();

        let tickets = store.load_tickets(true);
        assert_eq!(tickets.len(), 2);
        assert_eq!(tickets[0].summary.order_id, "T-11");
        assert_eq!(tickets[0].notes.len(), 1);

        assert_eq!(store.load_tickets(false)[0].summary.order_id, "T-10");
    }

    #[test]
    fn test_detail_found_with_or_without_prefix() {
        let dir = TempDir::new().unwrap();
        let detail = json!({"success": true, "data": {"summary": {"order_id": "T-12345"}}});
        fs::write(dir.path().join("ticket_detail_T-12345.json"), detail.to_string()).unwrap();
        let store = TicketStore::new(dir.path());

        for input in ["12345", "T-12345"] {
            let id = TicketId::parse(input).unwrap();
            let loaded = store.load_detail(&id).unwrap().expect("detail file");
            assert_eq!(loaded["summary"]["order_id"], "T-12345");
        }
    }

    #[test]
    fn test_write_detail_and_freshness() {
        let dir = TempDir::new().unwrap();
        let store = TicketStore::new(dir.path());
        let id = TicketId::parse("7").unwrap();
        assert!(!store.detail_is_fresh(&id, Duration::from_secs(3600)));

        store.write_detail(&id, &ticket(70, "T-7")).unwrap();
        assert!(store.detail_is_fresh(&id, Duration::from_secs(3600)));
        let loaded = store.load_detail(&id).unwrap().unwrap();
        assert_eq!(loaded["summary"]["id"], 70);
    }

    #[test]
    fn test_find_ticket_by_api_id() {
        let dir = TempDir::new().unwrap();
        let store = TicketStore::new(dir.path());
        store.write_cache(&[ticket(555, "T-10")]).unwrap();
        let found = store.find_ticket(&TicketId::parse("555").unwrap()).unwrap();
        assert_eq!(found.summary.order_id, "T-10");
    }
}
