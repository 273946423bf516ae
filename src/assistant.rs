//! The request path of NestBot: gather context, assemble the prompt, call
//! one vendor and turn every failure into a reply the user can read.

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::ai::{select_vendor, CompletionRequest, VendorClient};
use crate::cache::ResponseCache;
use crate::config::{AppPaths, Config, CurrentUser};
use crate::error::VendorError;
use crate::fallback::fallback_response;
use crate::knowledge::{knowledge_path_for, load_knowledge};
use crate::preferences::{PreferenceStore, UserPreferences};
use crate::prompt::{assemble, AssembledPrompt, PromptBudget, PromptInput};
use crate::provider::{SelectedModel, Vendor};
use crate::repairdesk::RepairDeskClient;
use crate::state::ChatMessage;
use crate::tickets::{Ticket, TicketId, TicketStore};

pub const EMPTY_REPLY: &str =
    "I apologize, but I received an empty response. Please try asking your question again.";
pub const MALFORMED_REPLY: &str = "I encountered an error while processing the API response.";

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub message: String,
    pub selected_model: Option<SelectedModel>,
    pub ticket_access: bool,
    pub specific_ticket: Option<TicketId>,
    /// Overrides the knowledge file picked from the knowledge directory.
    pub knowledge_path: Option<PathBuf>,
    /// Falls back to the user in config.json.
    pub current_user: Option<CurrentUser>,
    pub history: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            selected_model: None,
            ticket_access: true,
            specific_ticket: None,
            knowledge_path: None,
            current_user: None,
            history: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Vendor(Vendor),
    Fallback,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    pub source: ReplySource,
}

impl ChatReply {
    fn fallback(message: &str) -> Self {
        Self {
            text: fallback_response(message).to_string(),
            source: ReplySource::Fallback,
        }
    }
}

#[derive(Clone)]
pub struct Assistant {
    config: Arc<Config>,
    paths: AppPaths,
    tickets: TicketStore,
    preferences: PreferenceStore,
    cache: Arc<ResponseCache>,
    budget: PromptBudget,
}

impl Assistant {
    pub fn new(config: Config, paths: AppPaths) -> Self {
        Self {
            tickets: TicketStore::new(paths.cache_dir.clone()),
            preferences: PreferenceStore::new(paths.prefs_dir.clone()),
            config: Arc::new(config),
            paths,
            cache: Arc::new(ResponseCache::with_system_clock()),
            budget: PromptBudget::default(),
        }
    }

    pub fn with_budget(mut self, budget: PromptBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn tickets(&self) -> &TicketStore {
        &self.tickets
    }

    pub fn preferences(&self) -> &PreferenceStore {
        &self.preferences
    }

    /// Preferences of the user in config.json, or the `default` file.
    pub fn user_preferences(&self) -> Result<UserPreferences> {
        let user_id = self
            .config
            .current_user
            .as_ref()
            .map(|u| u.id.as_str())
            .unwrap_or("");
        self.preferences.load_user_preferences(user_id)
    }

    pub fn repairdesk(&self) -> Result<RepairDeskClient, crate::error::RepairDeskError> {
        RepairDeskClient::from_config(&self.config, self.cache.clone())
    }

    fn current_user(&self, request: &ChatRequest) -> Option<CurrentUser> {
        request
            .current_user
            .clone()
            .or_else(|| self.config.current_user.clone())
    }

    /// Collect every input for the prompt. Missing pieces are logged and
    /// left out.
    pub fn build_prompt(&self, request: &ChatRequest) -> AssembledPrompt {
        let ticket_context = request.ticket_access || request.specific_ticket.is_some();
        let mut input = PromptInput::new(&request.message);
        input.ticket_access = request.ticket_access;
        input.specific_ticket = request.specific_ticket.clone();
        input.history = request.history.clone();

        if let Some(id) = &request.specific_ticket {
            info!("Will include specific ticket {} in AI context", id);
        }
        if ticket_context {
            input.tickets = self.tickets.load_tickets(true);
            info!("Processed {} tickets for AI context", input.tickets.len());
        }
        if let Some(id) = &request.specific_ticket {
            input.specific_detail = match self.tickets.load_detail(id) {
                Ok(detail) => detail,
                Err(e) => {
                    warn!("Could not read ticket detail for {}: {}", id, e);
                    None
                }
            };
        }

        let knowledge_path = request
            .knowledge_path
            .clone()
            .unwrap_or_else(|| knowledge_path_for(&self.paths.knowledge_dir, ticket_context));
        input.knowledge = load_knowledge(&knowledge_path);

        let user = self.current_user(request);
        input.company = user
            .as_ref()
            .and_then(|u| u.company.clone())
            .or_else(|| self.config.store_name.clone());
        let user_id = user.as_ref().map(|u| u.id.as_str()).unwrap_or("");
        input.preferences = match self.preferences.load_user_preferences(user_id) {
            Ok(prefs) => Some(prefs),
            Err(e) => {
                warn!("Could not load user preferences: {}", e);
                None
            }
        };
        input.current_user = user;

        assemble(&input, &self.budget)
    }

    /// Answer one chat message. Never fails: vendor errors become readable
    /// text and a missing configuration yields a canned reply.
    pub async fn get_ai_response(&self, request: ChatRequest) -> ChatReply {
        let Some((vendor, model)) = select_vendor(&self.config, request.selected_model.as_ref())
        else {
            warn!("No valid AI API keys found in configuration");
            return ChatReply::fallback(&request.message);
        };

        // Ticket cache, detail, knowledge and preference files are read here
        let this = self.clone();
        let prompt_request = request.clone();
        let prompt = match tokio::task::spawn_blocking(move || this.build_prompt(&prompt_request)).await
        {
            Ok(prompt) => prompt,
            Err(e) => {
                error!("Prompt assembly failed: {}", e);
                return ChatReply::fallback(&request.message);
            }
        };
        let completion = CompletionRequest::from_prompt(&model, prompt, self.config.generation);

        let client = match VendorClient::for_vendor(vendor, &self.config) {
            Ok(client) => client,
            Err(e) => return self.reply_for_error(&request.message, e),
        };

        match client.complete(&completion).await {
            Ok(text) if text.trim().is_empty() => {
                warn!("{} returned an empty reply", vendor);
                ChatReply { text: EMPTY_REPLY.to_string(), source: ReplySource::Error }
            }
            Ok(text) => ChatReply { text, source: ReplySource::Vendor(vendor) },
            Err(e) => self.reply_for_error(&request.message, e),
        }
    }

    fn reply_for_error(&self, message: &str, err: VendorError) -> ChatReply {
        error!("Error calling {} API: {}", err.vendor(), err);
        match err {
            VendorError::Status { status, .. } => ChatReply {
                text: format!(
                    "I encountered an error while processing your request: {} error.",
                    status
                ),
                source: ReplySource::Error,
            },
            VendorError::MalformedResponse { .. } => ChatReply {
                text: MALFORMED_REPLY.to_string(),
                source: ReplySource::Error,
            },
            VendorError::MissingKey(_) | VendorError::Network { .. } | VendorError::Timeout { .. } => {
                ChatReply::fallback(message)
            }
        }
    }

    /// The internal RepairDesk id of a ticket, looked up in the ticket
    /// cache. Without a cache entry the ticket number itself is used.
    pub fn api_id_for(&self, id: &TicketId) -> String {
        self.tickets
            .find_ticket(id)
            .map(|t| t.summary.id)
            .filter(|api_id| !api_id.is_empty())
            .unwrap_or_else(|| id.digits().to_string())
    }

    /// Fetch one ticket from RepairDesk and store it as its detail file.
    pub async fn load_ticket(&self, id: &TicketId) -> Result<Ticket> {
        let api_id = self.api_id_for(id);
        info!("Loading ticket {} (API id {})", id, api_id);

        let data = self.repairdesk()?.get_ticket_by_id(&api_id).await?;
        self.tickets.write_detail(id, &data)?;

        self.tickets
            .load_detail(id)?
            .as_ref()
            .and_then(Ticket::from_value)
            .ok_or_else(|| anyhow!("Ticket {} returned no usable data", id))
    }
}
