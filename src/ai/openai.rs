use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{endpoint, http_client, CompletionRequest};
use crate::error::VendorError;
use crate::provider::Vendor;

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAIClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
        }
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, VendorError> {
        let vendor = Vendor::OpenAI;
        if self.api_key.is_empty() {
            return Err(VendorError::MissingKey(vendor));
        }

        let mut messages = vec![OpenAIMessage { role: "system", content: &request.system }];
        messages.extend(
            request
                .history
                .iter()
                .map(|m| OpenAIMessage { role: m.role.as_str(), content: &m.content }),
        );
        messages.push(OpenAIMessage { role: "user", content: &request.user });

        let body = OpenAIRequest {
            model: &request.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!("Making OpenAI API request with model: {}", request.model);
        let response = self
            .client
            .post(endpoint(&self.base_url, "/v1/chat/completions"))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| VendorError::from_reqwest(vendor, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| VendorError::from_reqwest(vendor, e))?;
        if !status.is_success() {
            return Err(VendorError::Status { vendor, status: status.as_u16(), body: text });
        }

        let parsed: OpenAIResponse = serde_json::from_str(&text).map_err(|e| {
            VendorError::MalformedResponse { vendor, detail: e.to_string() }
        })?;
        let reply = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| VendorError::MalformedResponse {
                vendor,
                detail: "response has no choices".to_string(),
            })?;

        info!("OpenAI API response successful. Model: {}", request.model);
        Ok(reply)
    }
}
