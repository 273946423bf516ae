use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{endpoint, http_client, CompletionRequest};
use crate::error::VendorError;
use crate::provider::Vendor;

#[derive(Serialize)]
struct ClaudeMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<ClaudeMessage<'a>>,
}

#[derive(Deserialize)]
struct ClaudeContent {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl ClaudeClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
        }
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, VendorError> {
        let vendor = Vendor::Claude;
        if self.api_key.is_empty() {
            return Err(VendorError::MissingKey(vendor));
        }

        let mut messages: Vec<ClaudeMessage> = request
            .history
            .iter()
            .map(|m| ClaudeMessage { role: m.role.as_str(), content: &m.content })
            .collect();
        messages.push(ClaudeMessage { role: "user", content: &request.user });

        let body = ClaudeRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: &request.system,
            messages,
        };

        debug!("Making Claude API request with model: {}", request.model);
        let response = self
            .client
            .post(endpoint(&self.base_url, "/v1/messages"))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
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

        let parsed: ClaudeResponse = serde_json::from_str(&text).map_err(|e| {
            VendorError::MalformedResponse { vendor, detail: e.to_string() }
        })?;
        let reply = parsed
            .content
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| VendorError::MalformedResponse {
                vendor,
                detail: "response has no content blocks".to_string(),
            })?;

        info!("Claude API response successful. Model: {}", request.model);
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ChatMessage;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "claude-3-haiku-20240307".to_string(),
            system: "You are NestBot".to_string(),
            history: vec![ChatMessage::user("hi"), ChatMessage::assistant("Hello!")],
            user: "Status of T-1?".to_string(),
            max_tokens: 1024,
            temperature: 0.7,
        }
    }

    #[tokio::test]
    async fn test_complete_sends_system_and_history() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(json!({
                "system": "You are NestBot",
                "max_tokens": 1024,
                "messages": [
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "Hello!"},
                    {"role": "user", "content": "Status of T-1?"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "It is ready."}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ClaudeClient::new("sk-ant", &server.uri(), Duration::from_secs(5));
        assert_eq!(client.complete(&request()).await.unwrap(), "It is ready.");
    }

    #[tokio::test]
    async fn test_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = ClaudeClient::new("sk-ant", &server.uri(), Duration::from_secs(5));
        match client.complete(&request()).await {
            Err(VendorError::Status { status, body, .. }) => {
                assert_eq!(status, 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_content_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": []})))
            .mount(&server)
            .await;

        let client = ClaudeClient::new("sk-ant", &server.uri(), Duration::from_secs(5));
        assert!(matches!(
            client.complete(&request()).await,
            Err(VendorError::MalformedResponse { .. })
        ));
    }
}
