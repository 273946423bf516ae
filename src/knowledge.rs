//! Knowledge files: JSON blobs of business and user context injected into
//! prompts.
//!
//! Two variants are generated from config: `user_context.json` carries the
//! `ticket_details` instructions, `user_context_general.json` does not.

use anyhow::Result;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::Config;

pub const TICKET_CONTEXT_FILE: &str = "user_context.json";
pub const GENERAL_CONTEXT_FILE: &str = "user_context_general.json";
pub const TICKET_DETAILS_KEY: &str = "ticket_details";

pub const TICKET_INSTRUCTIONS: &str = "VERY IMPORTANT INSTRUCTIONS: When asked about notes, comments, updates, or information about a specific ticket, you MUST refer to and summarize any notes found in the ticket data. Even if the notes are diagnostic reports or system information, they ARE still notes/comments on the ticket and should be mentioned. Any content in the 'msg_text' field IS a note/comment. Do NOT say there are no notes or comments if there are any present in the data.";

const AI_INSTRUCTIONS: &str = "IMPORTANT INSTRUCTIONS: DO NOT use last name in responses. DO NOT begin every response with greetings like 'Hello' or 'Hi' followed by name, only the first response. Respond directly to questions without these formalities after that.";

/// Read a knowledge file. Missing or unparsable files are logged and
/// yield `None`.
pub fn load_knowledge(path: &Path) -> Option<Value> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Could not read knowledge file {:?}: {}", path, e);
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Knowledge file {:?} is not valid JSON: {}", path, e);
            None
        }
    }
}

/// Drop the `ticket_details` section unless ticket context is allowed.
pub fn filter_knowledge(mut knowledge: Value, include_ticket_details: bool) -> Value {
    if !include_ticket_details {
        if let Value::Object(map) = &mut knowledge {
            map.remove(TICKET_DETAILS_KEY);
        }
    }
    knowledge
}

/// Ticket instructions carried by a knowledge blob, if any.
pub fn ticket_instructions(knowledge: &Value) -> Option<&str> {
    knowledge
        .get(TICKET_DETAILS_KEY)
        .and_then(|d| d.get("instructions"))
        .and_then(Value::as_str)
}

/// Which knowledge file fits the request.
pub fn knowledge_path_for(knowledge_dir: &Path, ticket_context: bool) -> PathBuf {
    if ticket_context {
        knowledge_dir.join(TICKET_CONTEXT_FILE)
    } else {
        knowledge_dir.join(GENERAL_CONTEXT_FILE)
    }
}

fn business_name(config: &Config, slug: &str, business: &Value) -> String {
    if let Some(name) = config.store_name.as_deref().filter(|n| !n.trim().is_empty()) {
        return name.to_string();
    }
    if let Some(name) = business.get("name").and_then(Value::as_str).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    slug.replace(['_', '-'], " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn guess_business_type(slug: &str) -> &'static str {
    let slug = slug.to_lowercase();
    let has_any = |terms: &[&str]| terms.iter().any(|t| slug.contains(t));
    if has_any(&["tech", "computer", "electronics", "repair", "phone", "cell"]) {
        "Technology Services"
    } else if has_any(&["bike", "cycle", "wheel"]) {
        "Bicycle Services"
    } else if has_any(&["jewel", "watch", "craft"]) {
        "Jewelry Services"
    } else {
        "Service Provider"
    }
}

/// The general knowledge blob for the configured store and user.
pub fn build_knowledge(config: &Config) -> Value {
    let slug = config.store_slug.clone().unwrap_or_default();
    let business = config.business.clone().unwrap_or(Value::Null);
    let user = config.current_user.clone().unwrap_or_default();

    let business_type = business
        .get("type")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| guess_business_type(&slug));
    let specialty = business
        .get("specialty")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("Customer service and repair");

    json!({
        "business": {
            "name": business_name(config, &slug, &business),
            "slug": slug,
            "type": business_type,
            "specialty": specialty,
        },
        "user": {
            "name": if user.name.is_empty() { "Unknown" } else { user.name.as_str() },
            "role": if user.role.is_empty() { "Staff" } else { user.role.as_str() },
            "id": if user.id.is_empty() { "0" } else { user.id.as_str() },
            "last_login": user.last_login,
        },
        "personalization": {
            "business_reference": "our shop",
            "tone": "friendly and helpful",
            "response_style": "direct and conversational",
            "ai_instructions": AI_INSTRUCTIONS,
        }
    })
}

/// Write both knowledge files into `dir`; returns the ticket-enabled path.
pub fn generate_knowledge_files(config: &Config, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let general = build_knowledge(config);
    let mut full = general.clone();
    if let Value::Object(map) = &mut full {
        map.insert(
            TICKET_DETAILS_KEY.to_string(),
            json!({ "instructions": TICKET_INSTRUCTIONS }),
        );
    }

    let full_path = dir.join(TICKET_CONTEXT_FILE);
    fs::write(&full_path, serde_json::to_string_pretty(&full)?)?;
    fs::write(dir.join(GENERAL_CONTEXT_FILE), serde_json::to_string_pretty(&general)?)?;

    info!(
        "Updated user context knowledge files for {}",
        general["user"]["name"].as_str().unwrap_or("Unknown")
    );
    Ok(full_path)
}
