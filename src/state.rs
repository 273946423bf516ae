//! UI-agnostic conversation state.
//!
//! The chat history lives only for the session; vendors see the most
//! recent turns of it.

use serde::{Deserialize, Serialize};

/// Turns sent to a vendor alongside the new message.
pub const HISTORY_WINDOW: usize = 5;

/// A chat message in the AI conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: &str) -> Self {
        Self { role: ChatRole::User, content: content.to_string() }
    }

    pub fn assistant(content: &str) -> Self {
        Self { role: ChatRole::Assistant, content: content.to_string() }
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> Vec<ChatMessage> {
        let start = self.messages.len().saturating_sub(n);
        self.messages[start..].to_vec()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_returns_tail_in_order() {
        let mut conversation = Conversation::new();
        for i in 0..7 {
            conversation.push(ChatMessage::user(&format!("m{}", i)));
        }
        let recent = conversation.recent(HISTORY_WINDOW);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].content, "m2");
        assert_eq!(recent[4].content, "m6");
    }

    #[test]
    fn test_recent_on_short_history() {
        let mut conversation = Conversation::new();
        conversation.push(ChatMessage::assistant("hi"));
        assert_eq!(conversation.recent(HISTORY_WINDOW).len(), 1);
    }
}
