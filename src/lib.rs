pub mod ai;
pub mod assistant;
pub mod cache;
pub mod config;
pub mod error;
pub mod fallback;
pub mod insights;
pub mod knowledge;
pub mod lenient;
pub mod panel;
pub mod preferences;
pub mod prompt;
pub mod provider;
pub mod repairdesk;
pub mod state;
pub mod tickets;

// Re-export main types for convenience
pub use ai::{select_vendor, ClaudeClient, CompletionRequest, GeminiClient, OpenAIClient, VendorClient};
pub use assistant::{Assistant, ChatReply, ChatRequest, ReplySource};
pub use cache::{Clock, ManualClock, ResponseCache, SystemClock};
pub use config::{AppPaths, Config, CurrentUser};
pub use error::{RepairDeskError, TicketIdError, VendorError};
pub use fallback::fallback_response;
pub use panel::{ChatCommand, ChatController, ChatPanel, PanelEntry, RequestId};
pub use preferences::{PreferenceStore, UserPreferences};
pub use prompt::{assemble, AssembledPrompt, PromptBudget, PromptInput};
pub use provider::{SelectedModel, Vendor};
pub use repairdesk::RepairDeskClient;
pub use state::{ChatMessage, ChatRole, Conversation};
pub use tickets::{Ticket, TicketId, TicketStore};
