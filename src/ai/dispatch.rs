use std::time::Duration;
use tracing::{info, warn};

use super::{ClaudeClient, CompletionRequest, GeminiClient, OpenAIClient};
use crate::config::Config;
use crate::error::VendorError;
use crate::provider::{SelectedModel, Vendor};

/// Pick the vendor and model for a request.
///
/// The requested vendor is used when it has a usable key; otherwise the
/// first usable vendor in the order Claude, OpenAI, Gemini is substituted.
/// `None` when no vendor has a usable key.
pub fn select_vendor(config: &Config, requested: Option<&SelectedModel>) -> Option<(Vendor, String)> {
    let valid = config.valid_vendors();
    let first = *valid.first()?;

    let vendor = match requested.and_then(SelectedModel::vendor) {
        Some(vendor) if valid.contains(&vendor) => vendor,
        Some(vendor) => {
            warn!("Selected API {} not available, using {} instead", vendor, first);
            first
        }
        None => first,
    };

    let model = requested
        .filter(|m| m.vendor() == Some(vendor))
        .map(|m| m.model.trim())
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| config.model_for(vendor));

    Some((vendor, model))
}

#[derive(Clone)]
pub enum VendorClient {
    Claude(ClaudeClient),
    OpenAI(OpenAIClient),
    Gemini(GeminiClient),
}

impl VendorClient {
    pub fn for_vendor(vendor: Vendor, config: &Config) -> Result<Self, VendorError> {
        let api_key = config.api_key(vendor).ok_or(VendorError::MissingKey(vendor))?;
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let endpoints = &config.endpoints;
        Ok(match vendor {
            Vendor::Claude => {
                VendorClient::Claude(ClaudeClient::new(api_key, &endpoints.claude, timeout))
            }
            Vendor::OpenAI => {
                VendorClient::OpenAI(OpenAIClient::new(api_key, &endpoints.openai, timeout))
            }
            Vendor::Gemini => {
                VendorClient::Gemini(GeminiClient::new(api_key, &endpoints.gemini, timeout))
            }
        })
    }

    pub fn vendor(&self) -> Vendor {
        match self {
            VendorClient::Claude(_) => Vendor::Claude,
            VendorClient::OpenAI(_) => Vendor::OpenAI,
            VendorClient::Gemini(_) => Vendor::Gemini,
        }
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, VendorError> {
        info!("Using {} model: {}", self.vendor(), request.model);
        match self {
            VendorClient::Claude(client) => client.complete(request).await,
            VendorClient::OpenAI(client) => client.complete(request).await,
            VendorClient::Gemini(client) => client.complete(request).await,
        }
    }
}
