pub mod claude;
pub mod dispatch;
pub mod gemini;
pub mod openai;

pub use claude::ClaudeClient;
pub use dispatch::{select_vendor, VendorClient};
pub use gemini::GeminiClient;
pub use openai::OpenAIClient;

use reqwest::Client;
use std::time::Duration;
use tracing::warn;

use crate::config::GenerationConfig;
use crate::prompt::AssembledPrompt;
use crate::state::ChatMessage;

/// One vendor-neutral completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub history: Vec<ChatMessage>,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn from_prompt(model: &str, prompt: AssembledPrompt, generation: GenerationConfig) -> Self {
        Self {
            model: model.to_string(),
            system: prompt.system,
            history: prompt.history,
            user: prompt.user,
            max_tokens: generation.max_tokens,
            temperature: generation.temperature,
        }
    }
}

/// A client with the configured request timeout. If the builder fails the
/// default client is used, which has no timeout, so that is logged.
pub(crate) fn http_client(timeout: Duration) -> Client {
    match Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            warn!(
                "Could not build HTTP client with a {:?} timeout, using defaults without one: {}",
                timeout, e
            );
            Client::default()
        }
    }
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}
