//! Ticket numbers.
//!
//! The canonical form is `T-<digits>`. Users and the RepairDesk API write
//! the same ticket as `12345`, `T12345`, `t-12345` or `#12345`; all of them
//! parse to the same [`TicketId`].

use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::TicketIdError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TicketId {
    digits: String,
}

impl TicketId {
    pub fn parse(input: &str) -> Result<Self, TicketIdError> {
        let trimmed = input.trim();
        let upper = trimmed.to_uppercase();
        let rest = upper.strip_prefix('#').unwrap_or(&upper);
        let rest = rest
            .strip_prefix("T-")
            .or_else(|| rest.strip_prefix('T'))
            .unwrap_or(rest)
            .trim();

        if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
            return Err(TicketIdError(trimmed.to_string()));
        }

        Ok(Self { digits: rest.to_string() })
    }

    /// The numeric part, as the RepairDesk API expects it.
    pub fn digits(&self) -> &str {
        &self.digits
    }

    /// `T-12345`
    pub fn display(&self) -> String {
        format!("T-{}", self.digits)
    }

    /// Name of the per-ticket cache file.
    pub fn detail_file_name(&self) -> String {
        format!("ticket_detail_{}.json", self.display())
    }

    /// Whether a raw id from the API (`order_id` or `id`) names this ticket.
    pub fn matches(&self, raw: &str) -> bool {
        TicketId::parse(raw).map(|other| other == *self).unwrap_or(false)
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T-{}", self.digits)
    }
}

impl FromStr for TicketId {
    type Err = TicketIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TicketId::parse(s)
    }
}

fn ticket_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)\bticket\s*(?:number|no\.?)?\s*[:#]?\s*(T-?\d+|\d+)\b|\b(T-?\d+)\b|#(\d+)\b",
        )
        .expect("ticket pattern is valid")
    })
}

/// Ticket numbers mentioned in free text, canonical and de-duplicated, in
/// order of first appearance.
pub fn extract_ticket_numbers(text: &str) -> Vec<TicketId> {
    let mut found: Vec<TicketId> = Vec::new();

    for captures in ticket_pattern().captures_iter(text) {
        let raw = captures
            .get(1)
            .or_else(|| captures.get(2))
            .or_else(|| captures.get(3))
            .map(|m| m.as_str());

        if let Some(id) = raw.and_then(|r| TicketId::parse(r).ok()) {
            if !found.contains(&id) {
                found.push(id);
            }
        }
    }

    found
}
