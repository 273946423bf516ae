//! Builds the vendor-neutral system prompt for one NestBot request.
//!
//! Sections are appended in a fixed order: persona, personalization,
//! communication preferences, knowledge, ticket summary and finally the
//! specific ticket with its notes. A section whose input is missing is
//! left out.

use chrono::{Local, TimeZone};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::CurrentUser;
use crate::knowledge::{filter_knowledge, ticket_instructions};
use crate::preferences::UserPreferences;
use crate::state::{ChatMessage, HISTORY_WINDOW};
use crate::tickets::{Ticket, TicketId, TicketNote};

pub const PERSONA: &str = "You are NestBot, an AI assistant for a computer repair shop.";

/// Size limits applied while assembling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptBudget {
    /// Most recent notes of the specific ticket that are kept.
    pub max_notes: usize,
    /// Longer note bodies are cut and end in "...".
    pub max_note_chars: usize,
    /// Ticket digests listed in the summary block.
    pub max_summary_tickets: usize,
    pub max_system_chars: usize,
}

impl Default for PromptBudget {
    fn default() -> Self {
        Self {
            max_notes: 20,
            max_note_chars: 500,
            max_summary_tickets: 50,
            max_system_chars: 60_000,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PromptInput {
    pub user_message: String,
    pub specific_ticket: Option<TicketId>,
    /// The specific ticket's raw detail record, when a detail file exists.
    /// Embedded as is, apart from its notes.
    pub specific_detail: Option<Value>,
    pub knowledge: Option<Value>,
    pub current_user: Option<CurrentUser>,
    pub company: Option<String>,
    pub tickets: Vec<Ticket>,
    pub preferences: Option<UserPreferences>,
    pub ticket_access: bool,
    pub history: Vec<ChatMessage>,
}

impl PromptInput {
    pub fn new(user_message: &str) -> Self {
        Self {
            user_message: user_message.to_string(),
            ..Self::default()
        }
    }

    fn ticket_context(&self) -> bool {
        self.ticket_access || self.specific_ticket.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPrompt {
    pub system: String,
    pub user: String,
    /// Prior turns, oldest first, already cut to the history window.
    pub history: Vec<ChatMessage>,
}

pub fn assemble(input: &PromptInput, budget: &PromptBudget) -> AssembledPrompt {
    let mut system = persona(input.company.as_deref());

    if let Some(first_name) = input.current_user.as_ref().and_then(|u| u.first_name()) {
        system.push_str(&format!(
            " The user's first name is {}. DO NOT use their last name.",
            first_name
        ));
    }

    if let Some(prefs) = &input.preferences {
        system.push_str(&preferences_section(prefs));
    }

    let knowledge = input
        .knowledge
        .clone()
        .map(|k| filter_knowledge(k, input.ticket_context()));
    match &knowledge {
        Some(k) => {
            let text = serde_json::to_string_pretty(k).unwrap_or_default();
            system.push_str("\n\nUse the following information about the user and the business:\n");
            system.push_str(&text);
        }
        None => debug!("No knowledge available for this prompt"),
    }

    if input.ticket_context() && !input.tickets.is_empty() {
        system.push_str(&summary_section(&input.tickets, budget));
    }

    if let Some(id) = &input.specific_ticket {
        let detail = input.specific_detail.clone().or_else(|| {
            input
                .tickets
                .iter()
                .find(|t| t.matches(id))
                .and_then(|t| serde_json::to_value(t).ok())
        });
        match detail {
            Some(record) => {
                let instructions = knowledge.as_ref().and_then(ticket_instructions);
                system.push_str(&specific_section(id, &record, instructions, budget));
            }
            None => info!("Ticket {} not found in detail files or ticket cache", id),
        }
    }

    truncate_chars(&mut system, budget.max_system_chars);

    let start = input.history.len().saturating_sub(HISTORY_WINDOW);
    AssembledPrompt {
        system,
        user: input.user_message.clone(),
        history: input.history[start..].to_vec(),
    }
}

fn persona(company: Option<&str>) -> String {
    match company.map(str::trim).filter(|c| !c.is_empty()) {
        Some(company) => format!(
            "You are NestBot, an AI assistant for {}, a computer repair shop.",
            company
        ),
        None => PERSONA.to_string(),
    }
}

fn preferences_section(prefs: &UserPreferences) -> String {
    let mut section = format!(
        "\n\nCommunication preferences: personality {}, detail level {}, language style {}.",
        prefs.personality, prefs.detail_level, prefs.language_style
    );
    match prefs.detail_level.as_str() {
        "low" => section.push_str(" Keep answers short."),
        "high" => section.push_str(" Give thorough, detailed answers."),
        _ => {}
    }
    if !prefs.favorite_topics.is_empty() {
        section.push_str(&format!(
            " The user is most interested in: {}.",
            prefs.favorite_topics.join(", ")
        ));
    }
    section
}

fn summary_section(tickets: &[Ticket], budget: &PromptBudget) -> String {
    let dated = tickets
        .iter()
        .filter_map(|t| t.summary.created_date.map(|d| (d, t.summary.order_id.as_str())));
    let oldest = dated.clone().min_by_key(|(d, _)| *d).map(|(_, id)| id);
    let newest = dated.max_by_key(|(d, _)| *d).map(|(_, id)| id);

    let shown: Vec<_> = tickets
        .iter()
        .take(budget.max_summary_tickets)
        .map(Ticket::process)
        .collect();
    let omitted = tickets.len() - shown.len();

    let mut section = format!(
        "\n\nYou have access to repair shop ticket data for {} tickets.",
        tickets.len()
    );
    if let (Some(oldest), Some(newest)) = (oldest, newest) {
        section.push_str(&format!(
            " The oldest ticket is {} and the newest ticket is {}.",
            oldest, newest
        ));
    }
    if omitted > 0 {
        section.push_str(&format!(" {} older tickets are not listed.", omitted));
    }

    let blob = json!({
        "summary": {
            "total_tickets": tickets.len(),
            "oldest_ticket": oldest,
            "newest_ticket": newest,
            "omitted_tickets": omitted,
        },
        "tickets": shown,
    });
    section.push_str("\n\nTicket Data:\n");
    section.push_str(&serde_json::to_string_pretty(&blob).unwrap_or_default());
    section
}

/// Notes sorted by creation time, the most recent `max_notes` kept and
/// each body trimmed.
pub fn prepare_notes(notes: &[TicketNote], budget: &PromptBudget) -> Vec<TicketNote> {
    let mut sorted = notes.to_vec();
    sorted.sort_by_key(|n| n.created_on.unwrap_or(0));
    let start = sorted.len().saturating_sub(budget.max_notes);
    sorted
        .drain(start..)
        .map(|mut note| {
            note.msg_text = trim_note(&note.msg_text, budget.max_note_chars);
            note
        })
        .collect()
}

fn trim_note(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

fn format_note_date(created_on: Option<i64>) -> String {
    created_on
        .and_then(|ts| Local.timestamp_opt(ts, 0).single())
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "Unknown date".to_string())
}

/// Notes of a raw detail record. Entries that do not parse are skipped
/// one by one, so a single odd note does not hide the others.
fn record_notes(record: &Value) -> Vec<TicketNote> {
    let Some(items) = record.get("notes").and_then(Value::as_array) else {
        return Vec::new();
    };
    let notes: Vec<TicketNote> = items
        .iter()
        .filter_map(|n| serde_json::from_value(n.clone()).ok())
        .collect();
    if notes.len() < items.len() {
        debug!("Skipped {} unreadable notes", items.len() - notes.len());
    }
    notes
}

fn specific_section(
    id: &TicketId,
    record: &Value,
    instructions: Option<&str>,
    budget: &PromptBudget,
) -> String {
    let notes = prepare_notes(&record_notes(record), budget);
    let activities = record
        .get("activities")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    let mut section = String::from("\n\n");

    if !notes.is_empty() {
        section.push_str(&format!("==== NOTES/COMMENTS FOR TICKET {} ====\n", id));
        let written = notes.iter().filter(|n| !n.msg_text.is_empty());
        for (i, note) in written.enumerate() {
            let title = if note.title.is_empty() { "Note" } else { note.title.as_str() };
            let author = if note.user.is_empty() { "Unknown user" } else { note.user.as_str() };
            section.push_str(&format!(
                "NOTE {}: {} (by {} on {})\n{}\n\n",
                i + 1,
                title,
                author,
                format_note_date(note.created_on),
                note.msg_text
            ));
        }
        section.push_str(&format!("==== END OF NOTES/COMMENTS FOR TICKET {} ====\n\n", id));
        match instructions {
            Some(text) => section.push_str(text),
            None => section.push_str(
                "Remember to check for notes and diagnostic reports when asked about ticket comments.",
            ),
        }
        section.push_str("\n\n");
    }

    section.push_str(&format!(
        "IMPORTANT: You have DETAILED information about ticket {} with {} notes/comments",
        id,
        notes.len()
    ));
    if activities > 0 {
        section.push_str(&format!(" and {} activity records", activities));
    }
    section.push('.');
    if record.pointer("/summary/customer").is_some() {
        section.push_str(" You also have customer details and status information.");
    }

    let diagnostic_count = notes.iter().filter(|n| n.is_diagnostic()).count();
    if diagnostic_count > 0 {
        section.push_str(&format!(
            " CRITICAL: This ticket contains {} diagnostic reports in the notes/comments. \
             These diagnostic reports ARE comments on the ticket. \
             When asked about comments or notes, you MUST include information about these diagnostic reports.",
            diagnostic_count
        ));
    }
    section.push_str(
        " Any content in the 'msg_text' field of the notes IS a ticket comment.",
    );

    let mut embedded = record.clone();
    if let Some(map) = embedded.as_object_mut() {
        if map.contains_key("notes") {
            map.insert("notes".to_string(), serde_json::to_value(&notes).unwrap_or_default());
        }
    }
    section.push_str(&format!("\n\nSpecific Ticket {}:\n", id));
    section.push_str(&serde_json::to_string_pretty(&embedded).unwrap_or_default());
    section
}

/// Cut `text` to at most `max_chars` characters.
fn truncate_chars(text: &mut String, max_chars: usize) {
    if let Some((byte_index, _)) = text.char_indices().nth(max_chars) {
        debug!("System prompt truncated to {} characters", max_chars);
        text.truncate(byte_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(order_id: &str, created: i64) -> Ticket {
        Ticket::from_value(&json!({
            "summary": {"id": created, "order_id": order_id, "created_date": created,
                        "customer": {"fullName": "Dana Kim"}},
            "devices": [{"device": {"name": "iPhone 13"}, "status": {"name": "Waiting"}}]
        }))
        .unwrap()
    }

    fn note(created_on: i64, text: &str) -> TicketNote {
        TicketNote {
            title: "Update".to_string(),
            user: "Sam".to_string(),
            created_on: Some(created_on),
            msg_text: text.to_string(),
            ..TicketNote::default()
        }
    }

    fn knowledge() -> Value {
        json!({
            "business": {"name": "Elite Repairs"},
            "ticket_details": {"instructions": "Notes ARE comments."}
        })
    }

    #[test]
    fn test_persona_and_first_name() {
        let mut input = PromptInput::new("hi");
        input.current_user = Some(CurrentUser {
            name: "Jordan Lee".to_string(),
            ..CurrentUser::default()
        });
        input.company = Some("Elite Repairs".to_string());
        let prompt = assemble(&input, &PromptBudget::default());
        assert!(prompt.system.starts_with("You are NestBot, an AI assistant for Elite Repairs"));
        assert!(prompt.system.contains("first name is Jordan. DO NOT use their last name."));
        assert!(!prompt.system.contains("Lee"));
        assert_eq!(prompt.user, "hi");
    }

    #[test]
    fn test_no_ticket_details_without_ticket_context() {
        let mut input = PromptInput::new("what's up");
        input.knowledge = Some(knowledge());
        input.tickets = vec![ticket("T-1", 100)];
        let prompt = assemble(&input, &PromptBudget::default());
        assert!(!prompt.system.contains("ticket_details"));
        assert!(!prompt.system.contains("Ticket Data"));
        assert!(prompt.system.contains("Elite Repairs"));
    }

    #[test]
    fn test_ticket_access_keeps_instructions_and_summary() {
        let mut input = PromptInput::new("oldest ticket?");
        input.knowledge = Some(knowledge());
        input.ticket_access = true;
        input.tickets = vec![ticket("T-2", 200), ticket("T-1", 100), ticket("T-3", 300)];
        let prompt = assemble(&input, &PromptBudget::default());
        assert!(prompt.system.contains("ticket_details"));
        assert!(prompt.system.contains("ticket data for 3 tickets"));
        assert!(prompt.system.contains("oldest ticket is T-1 and the newest ticket is T-3"));
    }

    #[test]
    fn test_summary_is_capped() {
        let mut input = PromptInput::new("tickets");
        input.ticket_access = true;
        input.tickets = (1..=5).map(|i| ticket(&format!("T-{}", i), i)).collect();
        let budget = PromptBudget { max_summary_tickets: 2, ..PromptBudget::default() };
        let prompt = assemble(&input, &budget);
        assert!(prompt.system.contains("3 older tickets are not listed"));
        assert!(prompt.system.contains("\"omitted_tickets\": 3"));
    }

    #[test]
    fn test_specific_ticket_notes_sorted_trimmed_and_capped() {
        let long = "x".repeat(600);
        let mut detail = ticket("T-12345", 1);
        detail.notes = vec![
            note(300, "third PC Diagnostic Report"),
            note(100, "first"),
            note(200, &long),
        ];
        let mut input = PromptInput::new("any notes?");
        input.specific_ticket = Some(TicketId::parse("12345").unwrap());
        input.specific_detail = Some(serde_json::to_value(&detail).unwrap());
        let budget = PromptBudget { max_notes: 2, ..PromptBudget::default() };
        let prompt = assemble(&input, &budget);

        let system = &prompt.system;
        assert!(system.contains("==== NOTES/COMMENTS FOR TICKET T-12345 ===="));
        assert!(!system.contains("NOTE 3"));
        assert!(!system.contains("\nfirst\n"));
        assert!(system.contains(&format!("{}...", "x".repeat(497))));
        assert!(!system.contains(&"x".repeat(498)));
        assert!(system.contains("1 diagnostic reports"));
        assert!(system.contains("ARE comments on the ticket"));
        let long_pos = system.find("xxx").unwrap();
        let third_pos = system.find("third PC").unwrap();
        assert!(long_pos < third_pos);
    }

    #[test]
    fn test_detail_record_embedded_with_unmodelled_fields() {
        let mut input = PromptInput::new("how do I reach the customer?");
        input.specific_ticket = Some(TicketId::parse("T-12345").unwrap());
        input.specific_detail = Some(json!({
            "summary": {"order_id": "T-12345",
                        "customer": {"fullName": "Dana Kim", "mobile": "555-0101",
                                     "email": "dana@example.com"}},
            "devices": [{"device": {"name": "Pixel 7"}, "imei": "356938035643809",
                         "repairProdItems": ["Screen"]}],
            "notes": [{"tittle": "Intake", "msg_text": "Cracked screen", "created_on": 10}]
        }));
        let prompt = assemble(&input, &PromptBudget::default());
        let system = &prompt.system;
        assert!(system.contains("555-0101"));
        assert!(system.contains("dana@example.com"));
        assert!(system.contains("356938035643809"));
        assert!(system.contains("\"Screen\""));
        assert!(system.contains("Cracked screen"));
        assert!(system.contains("You also have customer details"));
    }

    #[test]
    fn test_notes_numbered_without_gaps() {
        let mut detail = ticket("T-9", 1);
        detail.notes = vec![note(100, "first"), note(200, ""), note(300, "third")];
        let mut input = PromptInput::new("notes?");
        input.specific_ticket = Some(TicketId::parse("9").unwrap());
        input.specific_detail = Some(serde_json::to_value(&detail).unwrap());
        let prompt = assemble(&input, &PromptBudget::default());
        assert!(prompt.system.contains("NOTE 1: Update"));
        assert!(prompt.system.contains("NOTE 2: Update (by Sam on"));
        assert!(prompt.system.contains("\nthird\n"));
        assert!(!prompt.system.contains("NOTE 3"));
    }

    #[test]
    fn test_specific_ticket_found_in_loaded_list() {
        let mut input = PromptInput::new("status of T-7?");
        input.specific_ticket = Some(TicketId::parse("T-7").unwrap());
        input.tickets = vec![ticket("T-7", 7)];
        let prompt = assemble(&input, &PromptBudget::default());
        assert!(prompt.system.contains("DETAILED information about ticket T-7"));
    }

    #[test]
    fn test_system_text_capped_on_char_boundary() {
        let mut input = PromptInput::new("hi");
        input.knowledge = Some(json!({"motto": "é".repeat(1000)}));
        let budget = PromptBudget { max_system_chars: 120, ..PromptBudget::default() };
        let prompt = assemble(&input, &budget);
        assert_eq!(prompt.system.chars().count(), 120);
    }

    #[test]
    fn test_history_window() {
        let mut input = PromptInput::new("next");
        input.history = (0..8).map(|i| ChatMessage::user(&i.to_string())).collect();
        let prompt = assemble(&input, &PromptBudget::default());
        assert_eq!(prompt.history.len(), HISTORY_WINDOW);
        assert_eq!(prompt.history[0].content, "3");
    }

    #[test]
    fn test_preferences_section() {
        let mut input = PromptInput::new("hi");
        let mut prefs = UserPreferences::default();
        prefs.detail_level = "low".to_string();
        input.preferences = Some(prefs);
        let prompt = assemble(&input, &PromptBudget::default());
        assert!(prompt.system.contains("detail level low"));
        assert!(prompt.system.contains("Keep answers short."));
    }
}
