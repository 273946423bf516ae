use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{endpoint, http_client, CompletionRequest};
use crate::error::VendorError;
use crate::provider::Vendor;
use crate::state::ChatRole;

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
        }
    }

    /// Gemini takes no roles here: the system text, the prior turns and the
    /// new message are sent as consecutive parts of one content block.
    fn parts(request: &CompletionRequest) -> Vec<GeminiPart> {
        let mut parts = vec![GeminiPart { text: request.system.clone() }];
        if !request.history.is_empty() {
            let transcript = request
                .history
                .iter()
                .map(|m| {
                    let speaker = match m.role {
                        ChatRole::User => "User",
                        ChatRole::Assistant => "Assistant",
                    };
                    format!("{}: {}", speaker, m.content)
                })
                .collect::<Vec<_>>()
                .join("\n");
            parts.push(GeminiPart { text: format!("Previous conversation:\n{}", transcript) });
        }
        parts.push(GeminiPart { text: request.user.clone() });
        parts
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, VendorError> {
        let vendor = Vendor::Gemini;
        if self.api_key.is_empty() {
            return Err(VendorError::MissingKey(vendor));
        }

        let body = GeminiRequest {
            contents: vec![GeminiContent { parts: Self::parts(request) }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        };

        let url = endpoint(
            &self.base_url,
            &format!("/v1beta/models/{}:generateContent", request.model),
        );
        debug!("Making Gemini API request with model: {}", request.model);
        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
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

        let parsed: GeminiResponse = serde_json::from_str(&text).map_err(|e| {
            VendorError::MalformedResponse { vendor, detail: e.to_string() }
        })?;
        let reply = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| VendorError::MalformedResponse {
                vendor,
                detail: "response has no candidate text".to_string(),
            })?;

        info!("Gemini API response successful. Model: {}", request.model);
        Ok(reply)
    }
}
