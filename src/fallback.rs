//! Canned replies used when no AI vendor can answer.

pub const GREETING_RESPONSE: &str = "Hello! I'm NestBot, your AI assistant for the repair shop. While my AI services are currently unavailable, I can still help you navigate the system. What would you like to do?";

pub const TICKET_RESPONSE: &str = "I'd love to help you with ticket information! While my AI analysis is temporarily unavailable, you can view detailed ticket information in the main dashboard. Is there a specific ticket number you're looking for?";

pub const HELP_RESPONSE: &str = "I'm here to help! Although my AI capabilities are currently limited, you can:\n\n• View tickets in the Dashboard\n• Check customer information\n• Access PC and Mobile tools\n• Generate reports\n\nWhat specific task would you like assistance with?";

pub const CUSTOMER_RESPONSE: &str = "For customer information, please check the Customers section in the main application. I can help guide you there once my AI services are restored.";

pub const GENERIC_RESPONSE: &str = "I apologize, but my AI services are currently unavailable due to missing API configuration. However, I'm still here to help guide you through the Nest application. Please check with your administrator about setting up AI API keys, or let me know what specific task you need help with!";

/// Every reply `fallback_response` can produce.
pub const ALL_RESPONSES: [&str; 5] = [
    GREETING_RESPONSE,
    TICKET_RESPONSE,
    HELP_RESPONSE,
    CUSTOMER_RESPONSE,
    GENERIC_RESPONSE,
];

// Checked in this order; the first category with a hit wins.
const CATEGORIES: [(&[&str], &str); 4] = [
    (&["hi", "hello", "hey", "greetings"], GREETING_RESPONSE),
    (&["ticket", "repair", "status"], TICKET_RESPONSE),
    (&["help", "support", "how"], HELP_RESPONSE),
    (&["customer", "client"], CUSTOMER_RESPONSE),
];

pub fn fallback_response(message: &str) -> &'static str {
    let lowered = message.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    CATEGORIES
        .iter()
        .find(|(keywords, _)| {
            words.iter().any(|word| keywords.iter().any(|kw| matches_keyword(word, kw)))
        })
        .map(|(_, response)| *response)
        .unwrap_or(GENERIC_RESPONSE)
}

fn matches_keyword(word: &str, keyword: &str) -> bool {
    word == keyword || word.strip_suffix('s') == Some(keyword) || word.strip_suffix("es") == Some(keyword)
}
