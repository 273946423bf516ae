use serde::{Deserialize, Serialize};
use std::fmt;

/// The hosted AI vendors NestBot can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Claude,
    #[serde(alias = "gpt")]
    OpenAI,
    Gemini,
}

impl Vendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Claude => "claude",
            Vendor::OpenAI => "openai",
            Vendor::Gemini => "gemini",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "claude" | "anthropic" => Some(Vendor::Claude),
            "openai" | "gpt" | "chatgpt" => Some(Vendor::OpenAI),
            "gemini" | "google" => Some(Vendor::Gemini),
            _ => None,
        }
    }

    /// Fixed preference order used when substituting a vendor.
    pub fn all() -> Vec<Vendor> {
        vec![Vendor::Claude, Vendor::OpenAI, Vendor::Gemini]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Vendor::Claude => "Claude (Anthropic)",
            Vendor::OpenAI => "ChatGPT (OpenAI)",
            Vendor::Gemini => "Gemini (Google)",
        }
    }

    /// Placeholder value shipped in the sample config.
    pub fn placeholder_key(&self) -> String {
        format!("YOUR_{}_API_KEY_HERE", self.as_str().to_uppercase())
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Vendor::Claude => "claude-3-haiku-20240307",
            Vendor::OpenAI => "gpt-3.5-turbo",
            Vendor::Gemini => "gemini-1.5-pro",
        }
    }

    pub fn env_key(&self) -> &'static str {
        match self {
            Vendor::Claude => "ANTHROPIC_API_KEY",
            Vendor::OpenAI => "OPENAI_API_KEY",
            Vendor::Gemini => "GEMINI_API_KEY",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Vendor::Claude => "Claude",
            Vendor::OpenAI => "OpenAI",
            Vendor::Gemini => "Gemini",
        };
        f.write_str(name)
    }
}

/// An entry of the `ai_models` list in config.json.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedModel {
    pub name: String,
    pub api: String,
    #[serde(default)]
    pub model: String,
}

impl SelectedModel {
    pub fn vendor(&self) -> Option<Vendor> {
        Vendor::from_str(&self.api)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_accepts_aliases() {
        assert_eq!(Vendor::from_str("GPT"), Some(Vendor::OpenAI));
        assert_eq!(Vendor::from_str(" claude "), Some(Vendor::Claude));
        assert_eq!(Vendor::from_str("gemini"), Some(Vendor::Gemini));
        assert_eq!(Vendor::from_str("ollama"), None);
    }

    #[test]
    fn test_placeholder_key() {
        assert_eq!(Vendor::OpenAI.placeholder_key(), "YOUR_OPENAI_API_KEY_HERE");
    }

    #[test]
    fn test_selected_model_vendor() {
        let model: SelectedModel =
            serde_json::from_str(r#"{"name":"GPT 4o","api":"gpt","model":"gpt-4o"}"#).unwrap();
        assert_eq!(model.vendor(), Some(Vendor::OpenAI));
    }
}
