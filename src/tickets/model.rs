use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::lenient;
use super::TicketId;

const URGENT_PRIORITIES: &[&str] = &["high", "urgent", "critical"];
const CLOSED_STATUSES: &[&str] = &["closed", "resolved", "completed"];

fn is_closed_status(status: &str) -> bool {
    CLOSED_STATUSES.contains(&status.trim().to_lowercase().as_str())
}

/// A repair ticket snapshot as RepairDesk returns it. Any field may be
/// missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Ticket {
    #[serde(deserialize_with = "lenient::null_default")]
    pub summary: TicketSummary,
    #[serde(deserialize_with = "lenient::null_default")]
    pub devices: Vec<TicketDevice>,
    #[serde(deserialize_with = "lenient::null_default")]
    pub notes: Vec<TicketNote>,
    #[serde(deserialize_with = "lenient::null_default")]
    pub activities: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketSummary {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub order_id: String,
    #[serde(deserialize_with = "lenient::timestamp")]
    pub created_date: Option<i64>,
    #[serde(deserialize_with = "lenient::null_default")]
    pub customer: Customer,
    #[serde(deserialize_with = "lenient::string")]
    pub total: String,
    #[serde(deserialize_with = "lenient::string")]
    pub priority: String,
    #[serde(alias = "deadline", deserialize_with = "lenient::timestamp")]
    pub due_on: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Customer {
    #[serde(rename = "fullName", deserialize_with = "lenient::string")]
    pub full_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Named {
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Assignee {
    #[serde(deserialize_with = "lenient::string")]
    pub fullname: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketDevice {
    #[serde(deserialize_with = "lenient::null_default")]
    pub device: Named,
    #[serde(deserialize_with = "lenient::null_default")]
    pub status: Named,
    #[serde(deserialize_with = "lenient::null_default")]
    pub assigned_to: Assignee,
    #[serde(rename = "repairProdItems", deserialize_with = "lenient::null_default")]
    pub repair_items: Vec<Named>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketNote {
    /// RepairDesk spells it this way.
    #[serde(rename = "tittle", deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(deserialize_with = "lenient::string")]
    pub user: String,
    #[serde(deserialize_with = "lenient::timestamp")]
    pub created_on: Option<i64>,
    #[serde(deserialize_with = "lenient::string")]
    pub msg_text: String,
    /// Set on notes the customer wrote through the portal or by SMS.
    #[serde(deserialize_with = "lenient::null_default", skip_serializing_if = "is_false")]
    pub is_customer: bool,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

impl TicketNote {
    pub fn is_diagnostic(&self) -> bool {
        let text = self.msg_text.to_lowercase();
        text.contains("diagnostic") || text.contains("system information")
    }
}

/// The digest of a ticket embedded in prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedTicket {
    pub id: String,
    pub customer: String,
    pub total: String,
    pub devices: Vec<ProcessedDevice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedDevice {
    pub name: String,
    pub status: String,
    pub assigned_to: String,
    pub repair_items: Vec<String>,
}

impl Ticket {
    /// Parse one ticket, or `None` when the value is not an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    pub fn ticket_id(&self) -> Option<TicketId> {
        TicketId::parse(&self.summary.order_id).ok()
    }

    /// Matches on the display number first, then on the internal API id.
    pub fn matches(&self, id: &TicketId) -> bool {
        id.matches(&self.summary.order_id) || self.summary.id == id.digits()
    }

    /// True when any device is assigned to `name`, compared without case.
    pub fn is_assigned_to(&self, name: &str) -> bool {
        let name = name.trim();
        !name.is_empty()
            && self
                .devices
                .iter()
                .any(|d| d.assigned_to.fullname.trim().eq_ignore_ascii_case(name))
    }

    /// Open until every device reached a closed status.
    pub fn is_open(&self) -> bool {
        self.devices.is_empty() || self.devices.iter().any(|d| !is_closed_status(&d.status.name))
    }

    pub fn is_urgent(&self) -> bool {
        URGENT_PRIORITIES.contains(&self.summary.priority.trim().to_lowercase().as_str())
    }

    /// The newest note, by creation time.
    pub fn last_note(&self) -> Option<&TicketNote> {
        self.notes.iter().max_by_key(|n| n.created_on.unwrap_or(0))
    }

    pub fn process(&self) -> ProcessedTicket {
        ProcessedTicket {
            id: self.summary.order_id.clone(),
            customer: self.summary.customer.full_name.clone(),
            total: self.summary.total.clone(),
            devices: self
                .devices
                .iter()
                .map(|d| ProcessedDevice {
                    name: d.device.name.clone(),
                    status: d.status.name.clone(),
                    assigned_to: d.assigned_to.fullname.clone(),
                    repair_items: d.repair_items.iter().map(|i| i.name.clone()).collect(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "summary": {
                "id": 99812,
                "order_id": "T-1042",
                "created_date": 1700000000,
                "customer": {"fullName": "Dana Kim"},
                "total": 149.5
            },
            "devices": [{
                "device": {"name": "iPhone 13"},
                "status": {"name": "In Progress"},
                "assigned_to": null,
                "repairProdItems": [{"name": "Screen"}, {"name": "Battery"}]
            }],
            "notes": [{"tittle": "Intake", "user": "Sam", "created_on": "1700000100", "msg_text": "Cracked screen"}]
        })
    }

    #[test]
    fn test_parses_loose_ticket() {
        let ticket = Ticket::from_value(&sample()).unwrap();
        assert_eq!(ticket.summary.id, "99812");
        assert_eq!(ticket.summary.total, "149.5");
        assert_eq!(ticket.devices[0].assigned_to.fullname, "");
        assert_eq!(ticket.notes[0].created_on, Some(1700000100));
        assert_eq!(ticket.ticket_id().unwrap().display(), "T-1042");
    }

    #[test]
    fn test_process_digest() {
        let processed = Ticket::from_value(&sample()).unwrap().process();
        assert_eq!(processed.id, "T-1042");
        assert_eq!(processed.customer, "Dana Kim");
        assert_eq!(processed.devices[0].repair_items, vec!["Screen", "Battery"]);
    }

    #[test]
    fn test_matches_order_or_api_id() {
        let ticket = Ticket::from_value(&sample()).unwrap();
        assert!(ticket.matches(&TicketId::parse("1042").unwrap()));
        assert!(ticket.matches(&TicketId::parse("99812").unwrap()));
        assert!(!ticket.matches(&TicketId::parse("1").unwrap()));
    }

    #[test]
    fn test_empty_object_is_default_ticket() {
        let ticket = Ticket::from_value(&json!({})).unwrap();
        assert!(ticket.devices.is_empty());
        assert!(Ticket::from_value(&json!("ticketData")).is_none());
    }

    #[test]
    fn test_assignment_priority_and_status() {
        let ticket = Ticket::from_value(&json!({
            "summary": {"order_id": "T-7", "priority": "High", "deadline": "1700086400"},
            "devices": [
                {"status": {"name": "Completed"}, "assigned_to": {"fullname": "Dana Reyes"}},
                {"status": {"name": "Waiting for Parts"}, "assigned_to": {"fullname": "Sam Ortiz"}}
            ]
        }))
        .unwrap();
        assert!(ticket.is_assigned_to("dana reyes"));
        assert!(!ticket.is_assigned_to("Dana"));
        assert!(!ticket.is_assigned_to(""));
        assert!(ticket.is_urgent());
        assert!(ticket.is_open());
        assert_eq!(ticket.summary.due_on, Some(1700086400));

        let closed = Ticket::from_value(&json!({
            "devices": [{"status": {"name": "Closed"}}]
        }))
        .unwrap();
        assert!(!closed.is_open());
        assert!(!closed.is_urgent());
    }

    #[test]
    fn test_last_note_and_customer_flag() {
        let ticket = Ticket::from_value(&json!({
            "notes": [
                {"msg_text": "Any news?", "created_on": 300, "is_customer": true},
                {"msg_text": "Ordered part", "created_on": 200, "is_customer": null}
            ]
        }))
        .unwrap();
        let last = ticket.last_note().unwrap();
        assert_eq!(last.msg_text, "Any news?");
        assert!(last.is_customer);
        assert!(!ticket.notes[1].is_customer);
    }

    #[test]
    fn test_diagnostic_note() {
        let note = TicketNote {
            msg_text: "PC Diagnostic Report: SMART OK".to_string(),
            ..TicketNote::default()
        };
        assert!(note.is_diagnostic());
    }
}
