//! Ticket overviews for the chat commands and the periodic job insights.
//!
//! Everything here works on the cached ticket list; nothing calls
//! RepairDesk.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{Local, TimeZone};

use crate::preferences::UserPreferences;
use crate::tickets::Ticket;

/// Delay before the first insight check after the panel opens.
pub const FIRST_CHECK_DELAY: Duration = Duration::from_secs(5 * 60);
pub const CHECK_INTERVAL: Duration = Duration::from_secs(30 * 60);

const DAY_SECS: i64 = 24 * 60 * 60;
const MY_TICKETS_LIMIT: usize = 10;
const STORE_TICKETS_LIMIT: usize = 10;

pub const HELP_TEXT: &str = "**NestBot Help**

- /mytickets shows the open tickets assigned to you
- /store shows an overview of the store's tickets
- /settings shows your assistant preferences
- /clear clears the chat
- /help shows this list

Mention a ticket number like #123 in a message to include it in the context.";

fn format_day(ts: Option<i64>) -> Option<String> {
    ts.and_then(|ts| Local.timestamp_opt(ts, 0).single())
        .map(|d| d.format("%Y-%m-%d").to_string())
}

fn status_of(ticket: &Ticket) -> &str {
    ticket
        .devices
        .iter()
        .map(|d| d.status.name.as_str())
        .find(|s| !s.is_empty())
        .unwrap_or("Unknown")
}

fn device_of(ticket: &Ticket) -> &str {
    ticket
        .devices
        .iter()
        .map(|d| d.device.name.as_str())
        .find(|s| !s.is_empty())
        .unwrap_or("No device")
}

fn assignee_of(ticket: &Ticket) -> &str {
    ticket
        .devices
        .iter()
        .map(|d| d.assigned_to.fullname.as_str())
        .find(|s| !s.is_empty())
        .unwrap_or("Unassigned")
}

fn customer_of(ticket: &Ticket) -> &str {
    match ticket.summary.customer.full_name.as_str() {
        "" => "Unknown customer",
        name => name,
    }
}

/// Open tickets assigned to `user_name`, urgent ones first.
pub fn my_tickets<'a>(tickets: &'a [Ticket], user_name: &str) -> Vec<&'a Ticket> {
    let mut mine: Vec<&Ticket> = tickets
        .iter()
        .filter(|t| t.is_open() && t.is_assigned_to(user_name))
        .collect();
    // Stable, so cache order is kept within each group
    mine.sort_by_key(|t| !t.is_urgent());
    mine
}

pub fn format_my_tickets(tickets: &[&Ticket]) -> String {
    if tickets.is_empty() {
        return "You don't have any tickets assigned to you at the moment.".to_string();
    }

    let mut out = format!("**Your Current Tickets ({}):**\n", tickets.len());
    for ticket in tickets.iter().take(MY_TICKETS_LIMIT) {
        out.push_str(&format!(
            "\n**Ticket {}** - {}\n{} - Customer: {}\n",
            ticket.summary.order_id,
            status_of(ticket),
            device_of(ticket),
            customer_of(ticket)
        ));
        let due = format_day(ticket.summary.due_on);
        match (ticket.is_urgent(), due) {
            (true, Some(day)) => out.push_str(&format!("**URGENT** - Due {}\n", day)),
            (true, None) => out.push_str("**URGENT**\n"),
            (false, Some(day)) => out.push_str(&format!("Due: {}\n", day)),
            (false, None) => {}
        }
    }
    if tickets.len() > MY_TICKETS_LIMIT {
        out.push_str(&format!("\n...and {} more.\n", tickets.len() - MY_TICKETS_LIMIT));
    }
    out
}

/// Status counts plus the newest open tickets, urgent ones first.
pub fn store_overview(tickets: &[Ticket], store_name: &str) -> String {
    let open: Vec<&Ticket> = tickets.iter().filter(|t| t.is_open()).collect();
    if open.is_empty() {
        return "There are no active tickets for the store at the moment.".to_string();
    }

    let mut by_status: BTreeMap<&str, usize> = BTreeMap::new();
    for ticket in &open {
        *by_status.entry(status_of(ticket)).or_default() += 1;
    }

    let title = if store_name.is_empty() { "Store" } else { store_name };
    let mut out = format!("**{} Tickets Overview ({}):**\n\n**Status Summary:**\n", title, open.len());
    for (status, count) in &by_status {
        out.push_str(&format!("- {}: {}\n", status, count));
    }

    let mut recent = open;
    recent.sort_by_key(|t| (!t.is_urgent(), std::cmp::Reverse(t.summary.created_date.unwrap_or(0))));
    out.push_str("\n**Recent Tickets:**\n");
    for ticket in recent.iter().take(STORE_TICKETS_LIMIT) {
        let marker = if ticket.is_urgent() { " **URGENT**" } else { "" };
        out.push_str(&format!(
            "- {}{} - {} - {} - Technician: {}\n",
            ticket.summary.order_id,
            marker,
            status_of(ticket),
            customer_of(ticket),
            assignee_of(ticket)
        ));
    }
    out
}

/// One line per kind of insight the user has turned on. `now` is Unix
/// seconds.
pub fn job_insights(
    tickets: &[Ticket],
    user_name: &str,
    prefs: &UserPreferences,
    now: i64,
) -> Vec<String> {
    if !prefs.proactive_insights {
        return Vec::new();
    }
    let mine = my_tickets(tickets, user_name);
    let notify = &prefs.notification_preferences;
    let mut insights = Vec::new();

    if notify.urgent_tickets {
        let urgent = mine.iter().filter(|t| t.is_urgent()).count();
        if urgent > 0 {
            insights.push(format!("You have {} urgent tickets that may need attention.", urgent));
        }
    }

    if notify.deadlines {
        let due_soon = mine
            .iter()
            .filter_map(|t| t.summary.due_on)
            .filter(|due| (now..=now + DAY_SECS).contains(due))
            .count();
        if due_soon > 0 {
            insights.push(format!(
                "{} tickets have deadlines within the next 24 hours.",
                due_soon
            ));
        }
    }

    if notify.customer_responses {
        let responded = mine
            .iter()
            .filter_map(|t| t.last_note())
            .filter(|n| n.is_customer)
            .filter_map(|n| n.created_on)
            .filter(|at| now - at <= DAY_SECS)
            .count();
        if responded > 0 {
            insights.push(format!(
                "{} customers have responded to their tickets recently.",
                responded
            ));
        }
    }

    insights
}

/// The chat message for a set of insights, if there are any.
pub fn insight_update(insights: &[String]) -> Option<String> {
    if insights.is_empty() {
        return None;
    }
    Some(format!("**Job Insights Update**\n\n{}", insights.join("\n")))
}
