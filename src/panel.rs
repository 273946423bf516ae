//! Chat panel state and the controller that runs requests in the
//! background.
//!
//! Every request gets a [`RequestId`]; its "thinking" placeholder is
//! replaced by exactly that request's reply, whatever order replies
//! arrive in. Messages starting with `/` are chat commands and never reach
//! a vendor.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::assistant::{Assistant, ChatReply, ChatRequest};
use crate::error::TicketIdError;
use crate::insights::{
    format_my_tickets, insight_update, job_insights, my_tickets, store_overview, HELP_TEXT,
};
use crate::provider::SelectedModel;
use crate::state::{ChatMessage, Conversation, HISTORY_WINDOW};
use crate::tickets::{extract_ticket_numbers, TicketId};

pub type RequestId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelEntry {
    User(String),
    Assistant(String),
    System(String),
    Thinking(RequestId),
}

#[derive(Debug, Default)]
pub struct ChatPanel {
    entries: Vec<PanelEntry>,
    next_id: RequestId,
}

impl ChatPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the user's message and a placeholder for its reply.
    pub fn begin(&mut self, message: &str) -> RequestId {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(PanelEntry::User(message.to_string()));
        self.entries.push(PanelEntry::Thinking(id));
        id
    }

    /// Replace the placeholder of `id`. Returns false if there is none,
    /// e.g. after the panel was cleared.
    pub fn resolve(&mut self, id: RequestId, text: &str) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|entry| **entry == PanelEntry::Thinking(id))
        {
            Some(entry) => {
                *entry = PanelEntry::Assistant(text.to_string());
                true
            }
            None => false,
        }
    }

    pub fn push_user(&mut self, text: &str) {
        self.entries.push(PanelEntry::User(text.to_string()));
    }

    pub fn push_system(&mut self, text: &str) {
        self.entries.push(PanelEntry::System(text.to_string()));
    }

    pub fn entries(&self) -> &[PanelEntry] {
        &self.entries
    }

    pub fn pending(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, PanelEntry::Thinking(_)))
            .count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug)]
pub enum PanelEvent {
    Reply { id: RequestId, reply: ChatReply },
    TicketLoaded { ticket: TicketId, result: Result<usize, String> },
    /// Command output or a job insight, shown as a system entry.
    Notice(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Help,
    Clear,
    MyTickets,
    Store,
    Settings,
    Unknown(String),
}

impl ChatCommand {
    /// `None` unless the message starts with `/`.
    pub fn parse(message: &str) -> Option<Self> {
        let name = message.split_whitespace().next()?;
        if !name.starts_with('/') {
            return None;
        }
        Some(match name.to_lowercase().as_str() {
            "/help" => ChatCommand::Help,
            "/clear" => ChatCommand::Clear,
            "/mytickets" => ChatCommand::MyTickets,
            "/store" => ChatCommand::Store,
            "/settings" => ChatCommand::Settings,
            _ => ChatCommand::Unknown(name.to_string()),
        })
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

/// The system entry a command produces. Only `/mytickets`, `/store` and
/// `/settings` touch the disk.
fn command_output(assistant: &Assistant, command: &ChatCommand) -> String {
    let config = assistant.config();
    let user_name = config
        .current_user
        .as_ref()
        .map(|u| u.name.trim())
        .unwrap_or("");

    match command {
        ChatCommand::Help => HELP_TEXT.to_string(),
        ChatCommand::Clear => "Chat cleared.".to_string(),
        ChatCommand::Unknown(name) => {
            format!("Unknown command {}. Type /help to see the commands.", name)
        }
        ChatCommand::MyTickets => {
            if user_name.is_empty() {
                return "I couldn't identify your user account. Set current_user in config.json."
                    .to_string();
            }
            let tickets = assistant.tickets().load_tickets(false);
            format_my_tickets(&my_tickets(&tickets, user_name))
        }
        ChatCommand::Store => {
            let store = config
                .store_name
                .as_deref()
                .or(config.store_slug.as_deref())
                .unwrap_or("");
            store_overview(&assistant.tickets().load_tickets(false), store)
        }
        ChatCommand::Settings => match assistant.user_preferences() {
            Ok(prefs) => {
                let notify = &prefs.notification_preferences;
                format!(
                    "**NestBot Settings**\n\nPersonality: {}\nDetail level: {}\nLanguage style: {}\n\
                     Proactive insights: {}\nUrgent tickets: {}\nDeadlines: {}\n\
                     Customer responses: {}\nTeam updates: {}\n\n\
                     Change a setting with `nestbot prefs set <key> <value>`.",
                    prefs.personality,
                    prefs.detail_level,
                    prefs.language_style,
                    on_off(prefs.proactive_insights),
                    on_off(notify.urgent_tickets),
                    on_off(notify.deadlines),
                    on_off(notify.customer_responses),
                    on_off(notify.team_updates),
                )
            }
            Err(e) => format!("Could not load your settings: {}", e),
        },
    }
}

/// The insight message for the current user, if they want one and there is
/// something to report. `now` is Unix seconds.
fn check_job_insights(assistant: &Assistant, now: i64) -> Option<String> {
    let prefs = match assistant.user_preferences() {
        Ok(prefs) => prefs,
        Err(e) => {
            warn!("Could not load preferences for job insights: {}", e);
            return None;
        }
    };
    if !prefs.proactive_insights {
        debug!("Proactive insights are off");
        return None;
    }
    let user_name = assistant
        .config()
        .current_user
        .as_ref()
        .map(|u| u.name.clone())
        .unwrap_or_default();
    if user_name.trim().is_empty() {
        debug!("No current user, skipping job insights");
        return None;
    }
    let tickets = assistant.tickets().load_tickets(false);
    insight_update(&job_insights(&tickets, &user_name, &prefs, now))
}

pub struct ChatController {
    assistant: Assistant,
    panel: ChatPanel,
    conversation: Conversation,
    ticket_access: bool,
    specific_ticket: Option<TicketId>,
    selected_model: Option<SelectedModel>,
    tx: mpsc::UnboundedSender<PanelEvent>,
    rx: mpsc::UnboundedReceiver<PanelEvent>,
    insights: Option<JoinHandle<()>>,
}

impl ChatController {
    pub fn new(assistant: Assistant) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let selected_model = assistant.config().model_choices().into_iter().next();
        Self {
            assistant,
            panel: ChatPanel::new(),
            conversation: Conversation::new(),
            ticket_access: true,
            specific_ticket: None,
            selected_model,
            tx,
            rx,
            insights: None,
        }
    }

    pub fn panel(&self) -> &ChatPanel {
        &self.panel
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn assistant(&self) -> &Assistant {
        &self.assistant
    }

    pub fn ticket_access(&self) -> bool {
        self.ticket_access
    }

    pub fn set_ticket_access(&mut self, enabled: bool) {
        self.ticket_access = enabled;
        info!("Ticket access {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn specific_ticket(&self) -> Option<&TicketId> {
        self.specific_ticket.as_ref()
    }

    pub fn clear_specific_ticket(&mut self) {
        self.specific_ticket = None;
    }

    pub fn selected_model(&self) -> Option<&SelectedModel> {
        self.selected_model.as_ref()
    }

    pub fn select_model(&mut self, model: SelectedModel) {
        info!("Selected model {} ({})", model.name, model.api);
        self.selected_model = Some(model);
    }

    /// Start a request and return right away; the reply is applied by a
    /// later [`drain`](Self::drain).
    pub fn send(&mut self, message: &str) -> Option<RequestId> {
        let message = message.trim();
        if message.is_empty() {
            return None;
        }
        if let Some(command) = ChatCommand::parse(message) {
            self.run_command(message, command);
            return None;
        }

        if let Some(ticket) = extract_ticket_numbers(message).into_iter().next() {
            if self.specific_ticket.as_ref() != Some(&ticket) {
                debug!("Detected ticket {} in message", ticket);
                self.specific_ticket = Some(ticket);
            }
        }

        let request = ChatRequest {
            selected_model: self.selected_model.clone(),
            ticket_access: self.ticket_access,
            specific_ticket: self.specific_ticket.clone(),
            history: self.conversation.recent(HISTORY_WINDOW),
            ..ChatRequest::new(message)
        };
        self.conversation.push(ChatMessage::user(message));
        let id = self.panel.begin(message);

        let assistant = self.assistant.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let reply = assistant.get_ai_response(request).await;
            if tx.send(PanelEvent::Reply { id, reply }).is_err() {
                debug!("Chat panel closed before reply {} arrived", id);
            }
        });
        Some(id)
    }

    fn run_command(&mut self, message: &str, command: ChatCommand) {
        debug!("Running chat command {:?}", command);
        match command {
            ChatCommand::Clear => self.clear(),
            ChatCommand::Help | ChatCommand::Unknown(_) => {
                self.panel.push_user(message);
                self.panel.push_system(&command_output(&self.assistant, &command));
            }
            command => {
                self.panel.push_user(message);
                let assistant = self.assistant.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let text = match tokio::task::spawn_blocking(move || {
                        command_output(&assistant, &command)
                    })
                    .await
                    {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Chat command failed: {}", e);
                            "That command failed. Check nest.log for details.".to_string()
                        }
                    };
                    let _ = tx.send(PanelEvent::Notice(text));
                });
            }
        }
    }

    /// Check for job insights after `first`, then every `every`, posting
    /// each update as a system entry. Restarting replaces the running
    /// schedule.
    pub fn start_insights(&mut self, first: Duration, every: Duration) {
        if let Some(task) = self.insights.take() {
            task.abort();
        }
        info!("Starting job insight checks every {:?}", every);
        let assistant = self.assistant.clone();
        let tx = self.tx.clone();
        self.insights = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + first, every);
            loop {
                ticker.tick().await;
                let check = assistant.clone();
                let now = chrono::Utc::now().timestamp();
                let update =
                    match tokio::task::spawn_blocking(move || check_job_insights(&check, now)).await
                    {
                        Ok(update) => update,
                        Err(e) => {
                            warn!("Job insight check failed: {}", e);
                            None
                        }
                    };
                if let Some(text) = update {
                    if tx.send(PanelEvent::Notice(text)).is_err() {
                        break;
                    }
                }
            }
        }));
    }

    /// Fetch a ticket from RepairDesk in the background and make it the
    /// specific ticket of following requests.
    pub fn load_ticket(&mut self, raw: &str) -> Result<TicketId, TicketIdError> {
        let ticket = TicketId::parse(raw)?;
        self.specific_ticket = Some(ticket.clone());
        self.panel.push_system(&format!("Loading ticket {}...", ticket));

        let assistant = self.assistant.clone();
        let tx = self.tx.clone();
        let id = ticket.clone();
        tokio::spawn(async move {
            let result = assistant
                .load_ticket(&id)
                .await
                .map(|t| t.notes.len())
                .map_err(|e| e.to_string());
            let _ = tx.send(PanelEvent::TicketLoaded { ticket: id, result });
        });
        Ok(ticket)
    }

    fn apply(&mut self, event: PanelEvent) {
        match event {
            PanelEvent::Reply { id, reply } => {
                if self.panel.resolve(id, &reply.text) {
                    self.conversation.push(ChatMessage::assistant(&reply.text));
                } else {
                    debug!("Dropping reply {} with no placeholder", id);
                }
            }
            PanelEvent::TicketLoaded { ticket, result } => match result {
                Ok(notes) => self.panel.push_system(&format!(
                    "Ticket {} loaded with {} notes. It will be included in the next questions.",
                    ticket, notes
                )),
                Err(e) => {
                    warn!("Could not load ticket {}: {}", ticket, e);
                    self.panel
                        .push_system(&format!("Could not load ticket {}: {}", ticket, e));
                }
            },
            PanelEvent::Notice(text) => self.panel.push_system(&text),
        }
    }

    /// Apply every finished background result. Returns how many were
    /// applied.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Wait for the next background result and apply it.
    pub async fn next_event(&mut self) -> bool {
        match self.rx.recv().await {
            Some(event) => {
                self.apply(event);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.panel.clear();
        self.conversation.clear();
    }
}

impl Drop for ChatController {
    fn drop(&mut self) {
        if let Some(task) = self.insights.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppPaths, Config};
    use crate::fallback::{GREETING_RESPONSE, TICKET_RESPONSE};
    use crate::preferences::UserPreferences;
    use serde_json::json;
    use tempfile::TempDir;

    fn controller(dir: &TempDir) -> ChatController {
        let assistant = Assistant::new(Config::new(), AppPaths::rooted(dir.path()));
        ChatController::new(assistant)
    }

    /// A controller for Dana Reyes with two cached tickets, one hers.
    fn shop_controller(dir: &TempDir) -> ChatController {
        let config: Config = serde_json::from_str(
            r#"{"store_name": "Elite Repairs", "current_user": {"id": 7, "name": "Dana Reyes"}}"#,
        )
        .unwrap();
        let assistant = Assistant::new(config, AppPaths::rooted(dir.path()));
        let now = chrono::Utc::now().timestamp();
        assistant
            .tickets()
            .write_cache(&[
                json!({
                    "summary": {"order_id": "T-1", "priority": "urgent", "due_on": now + 3600,
                                "customer": {"fullName": "Ana Ruiz"}},
                    "devices": [{"device": {"name": "iPhone 13"}, "status": {"name": "In Progress"},
                                 "assigned_to": {"fullname": "Dana Reyes"}}]
                }),
                json!({
                    "summary": {"order_id": "T-4"},
                    "devices": [{"status": {"name": "Waiting for Parts"},
                                 "assigned_to": {"fullname": "Sam Ortiz"}}]
                }),
            ])
            .unwrap();
        ChatController::new(assistant)
    }

    fn last_system(chat: &ChatController) -> String {
        match chat.panel().entries().last() {
            Some(PanelEntry::System(text)) => text.clone(),
            other => panic!("expected system entry, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_out_of_order() {
        let mut panel = ChatPanel::new();
        let first = panel.begin("one");
        let second = panel.begin("two");

        assert!(panel.resolve(second, "reply two"));
        assert!(panel.resolve(first, "reply one"));
        assert_eq!(
            panel.entries(),
            &[
                PanelEntry::User("one".to_string()),
                PanelEntry::Assistant("reply one".to_string()),
                PanelEntry::User("two".to_string()),
                PanelEntry::Assistant("reply two".to_string()),
            ]
        );
        assert!(!panel.resolve(first, "again"));
        assert_eq!(panel.pending(), 0);
    }

    #[tokio::test]
    async fn test_send_returns_before_reply_and_drains() {
        let dir = TempDir::new().unwrap();
        let mut chat = controller(&dir);

        let first = chat.send("hello").unwrap();
        let second = chat.send("what about my repair?").unwrap();
        assert_ne!(first, second);
        assert!(chat.send("   ").is_none());

        while chat.panel().pending() > 0 {
            assert!(chat.next_event().await);
        }
        let entries = chat.panel().entries();
        assert_eq!(entries[1], PanelEntry::Assistant(GREETING_RESPONSE.to_string()));
        assert_eq!(entries[3], PanelEntry::Assistant(TICKET_RESPONSE.to_string()));
        assert_eq!(chat.conversation().len(), 4);
        assert_eq!(chat.drain(), 0);
    }

    #[tokio::test]
    async fn test_ticket_number_in_message_becomes_specific_ticket() {
        let dir = TempDir::new().unwrap();
        let mut chat = controller(&dir);
        chat.send("What's going on with ticket #4411?");
        assert_eq!(chat.specific_ticket().map(|t| t.display()), Some("T-4411".to_string()));
        chat.next_event().await;
    }

    #[tokio::test]
    async fn test_load_ticket_reports_failure() {
        let dir = TempDir::new().unwrap();
        let mut chat = controller(&dir);
        assert!(chat.load_ticket("not a ticket").is_err());

        let ticket = chat.load_ticket("T-55").unwrap();
        assert_eq!(chat.specific_ticket(), Some(&ticket));
        assert!(chat.next_event().await);
        match chat.panel().entries().last() {
            Some(PanelEntry::System(text)) => assert!(text.starts_with("Could not load ticket T-55")),
            other => panic!("expected system entry, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_chat_command() {
        assert_eq!(ChatCommand::parse("/help"), Some(ChatCommand::Help));
        assert_eq!(ChatCommand::parse("  /MyTickets please"), Some(ChatCommand::MyTickets));
        assert_eq!(
            ChatCommand::parse("/analyze #12"),
            Some(ChatCommand::Unknown("/analyze".to_string()))
        );
        assert_eq!(ChatCommand::parse("what is /store?"), None);
        assert_eq!(ChatCommand::parse(""), None);
    }

    #[tokio::test]
    async fn test_help_and_unknown_commands_answer_locally() {
        let dir = TempDir::new().unwrap();
        let mut chat = controller(&dir);
        assert!(chat.send("/help").is_none());
        assert_eq!(
            chat.panel().entries(),
            &[
                PanelEntry::User("/help".to_string()),
                PanelEntry::System(HELP_TEXT.to_string()),
            ]
        );

        assert!(chat.send("/frobnicate").is_none());
        assert!(last_system(&chat).starts_with("Unknown command /frobnicate"));
        assert!(chat.conversation().is_empty());
        assert_eq!(chat.panel().pending(), 0);
        assert_eq!(chat.drain(), 0);
    }

    #[tokio::test]
    async fn test_clear_command_empties_chat() {
        let dir = TempDir::new().unwrap();
        let mut chat = controller(&dir);
        chat.send("hello");
        assert!(chat.send("/clear").is_none());
        assert!(chat.panel().entries().is_empty());
        assert!(chat.conversation().is_empty());
        chat.next_event().await;
        assert!(chat.panel().entries().is_empty());
    }

    #[tokio::test]
    async fn test_mytickets_lists_only_own_open_tickets() {
        let dir = TempDir::new().unwrap();
        let mut chat = shop_controller(&dir);
        assert!(chat.send("/mytickets").is_none());
        assert!(chat.next_event().await);
        let text = last_system(&chat);
        assert!(text.starts_with("**Your Current Tickets (1):**"));
        assert!(text.contains("**Ticket T-1** - In Progress"));
        assert!(!text.contains("T-4"));
        assert!(chat.conversation().is_empty());
    }

    #[tokio::test]
    async fn test_store_and_settings_commands() {
        let dir = TempDir::new().unwrap();
        let mut chat = shop_controller(&dir);
        chat.send("/store");
        assert!(chat.next_event().await);
        let text = last_system(&chat);
        assert!(text.starts_with("**Elite Repairs Tickets Overview (2):**"));
        assert!(text.contains("Technician: Sam Ortiz"));

        chat.send("/settings");
        assert!(chat.next_event().await);
        let text = last_system(&chat);
        assert!(text.contains("Personality: helpful"));
        assert!(text.contains("Proactive insights: on"));
    }

    #[tokio::test]
    async fn test_insights_posted_on_schedule() {
        let dir = TempDir::new().unwrap();
        let mut chat = shop_controller(&dir);
        chat.start_insights(Duration::from_millis(10), Duration::from_secs(3600));

        let applied = time::timeout(Duration::from_secs(5), chat.next_event())
            .await
            .unwrap();
        assert!(applied);
        let text = last_system(&chat);
        assert!(text.starts_with("**Job Insights Update**"));
        assert!(text.contains("You have 1 urgent tickets that may need attention."));
        assert!(text.contains("1 tickets have deadlines within the next 24 hours."));
    }

    #[tokio::test]
    async fn test_insights_respect_preferences() {
        let dir = TempDir::new().unwrap();
        let mut chat = shop_controller(&dir);
        let mut prefs = UserPreferences::default();
        prefs.notification_preferences.urgent_tickets = false;
        chat.assistant().preferences().save_user_preferences("7", &prefs).unwrap();

        chat.start_insights(Duration::ZERO, Duration::from_secs(3600));
        time::timeout(Duration::from_secs(5), chat.next_event())
            .await
            .unwrap();
        let text = last_system(&chat);
        assert!(!text.contains("urgent"));
        assert!(text.contains("deadlines within the next 24 hours"));

        prefs.proactive_insights = false;
        chat.assistant().preferences().save_user_preferences("7", &prefs).unwrap();
        chat.start_insights(Duration::ZERO, Duration::from_millis(20));
        let quiet = time::timeout(Duration::from_millis(300), chat.next_event()).await;
        assert!(quiet.is_err());
    }

    #[tokio::test]
    async fn test_cleared_panel_drops_late_reply() {
        let dir = TempDir::new().unwrap();
        let mut chat = controller(&dir);
        chat.send("hi");
        chat.clear();
        chat.next_event().await;
        assert!(chat.panel().entries().is_empty());
        assert!(chat.conversation().is_empty());
    }
}
