use ratatui::layout::Rect;
use ratatui::widgets::ListState;

use nest_assistant::panel::{ChatController, PanelEntry};
use nest_assistant::{Assistant, SelectedModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Chat state
    pub chat: ChatController,
    pub query_input: String,
    pub query_cursor: usize, // cursor position in query_input, in chars
    pub chat_scroll: u16,
    pub chat_height: u16, // inner height of the chat area
    pub chat_width: u16,  // inner width of the chat area

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Model picker state
    pub show_model_picker: bool,
    pub available_models: Vec<SelectedModel>,
    pub model_picker_state: ListState,

    // Ticket number popup
    pub show_ticket_input: bool,
    pub ticket_input: String,

    // Chat area for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,
}

impl App {
    pub fn new(assistant: Assistant) -> Self {
        let available_models = assistant.config().model_choices();
        let preferred = preferred_model(&assistant, &available_models);
        let mut chat = ChatController::new(assistant);
        if let Some(model) = preferred {
            chat.select_model(model);
        }
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            chat,
            query_input: String::new(),
            query_cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            animation_frame: 0,
            show_model_picker: false,
            available_models,
            model_picker_state: ListState::default(),
            show_ticket_input: false,
            ticket_input: String::new(),
            chat_area: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.chat.panel().pending() > 0
    }

    pub fn tick_animation(&mut self) {
        if self.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Apply finished replies and keep the newest one in view.
    pub fn poll_replies(&mut self) {
        if self.chat.drain() > 0 {
            self.scroll_chat_to_bottom();
        }
    }

    pub fn submit_query(&mut self) {
        if self.query_input.trim().is_empty() {
            return;
        }
        let message = std::mem::take(&mut self.query_input);
        self.query_cursor = 0;
        self.chat.send(&message);
        self.scroll_chat_to_bottom();
    }

    pub fn submit_ticket(&mut self) {
        let raw = std::mem::take(&mut self.ticket_input);
        self.show_ticket_input = false;
        if let Err(e) = self.chat.load_ticket(&raw) {
            tracing::warn!("{}", e);
        }
        self.scroll_chat_to_bottom();
    }

    pub fn toggle_ticket_access(&mut self) {
        let enabled = !self.chat.ticket_access();
        self.chat.set_ticket_access(enabled);
    }

    /// Scroll chat to bottom so the newest entry is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 { self.chat_width as usize } else { 50 };

        let mut total_lines: usize = 0;
        for entry in self.chat.panel().entries() {
            let content = match entry {
                PanelEntry::User(text) | PanelEntry::Assistant(text) | PanelEntry::System(text) => {
                    text.as_str()
                }
                PanelEntry::Thinking(_) => "Thinking...",
            };
            total_lines += 1; // Role line
            for line in content.lines() {
                let char_count = line.chars().count();
                total_lines += (char_count / wrap_width) + 1;
            }
            total_lines += 1; // Blank line after entry
        }

        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        // Paragraph scroll offsets are u16
        let max_scroll = total_lines.saturating_sub(visible_height as usize);
        self.chat_scroll = u16::try_from(max_scroll).unwrap_or(u16::MAX);
    }

    pub fn open_model_picker(&mut self) {
        if self.available_models.is_empty() {
            return;
        }
        let current = self
            .chat
            .selected_model()
            .and_then(|m| self.available_models.iter().position(|a| a == m))
            .unwrap_or(0);
        self.model_picker_state.select(Some(current));
        self.show_model_picker = true;
    }

    pub fn model_picker_nav_down(&mut self) {
        let len = self.available_models.len();
        if len > 0 {
            let i = self.model_picker_state.selected().map_or(0, |i| (i + 1) % len);
            self.model_picker_state.select(Some(i));
        }
    }

    pub fn model_picker_nav_up(&mut self) {
        let len = self.available_models.len();
        if len > 0 {
            let i = self
                .model_picker_state
                .selected()
                .map_or(0, |i| if i == 0 { len - 1 } else { i - 1 });
            self.model_picker_state.select(Some(i));
        }
    }

    pub fn select_model(&mut self) {
        if let Some(model) = self
            .model_picker_state
            .selected()
            .and_then(|i| self.available_models.get(i))
            .cloned()
        {
            self.chat.select_model(model);
        }
        self.show_model_picker = false;
    }

    pub fn model_title(&self) -> String {
        match self.chat.selected_model() {
            Some(model) => format!(" {} ({}) ", model.name, model.model),
            None => " No AI configured ".to_string(),
        }
    }
}

/// The current user's `preferred_model`, if it names one of the choices.
fn preferred_model(assistant: &Assistant, choices: &[SelectedModel]) -> Option<SelectedModel> {
    let prefs = match assistant.user_preferences() {
        Ok(prefs) => prefs,
        Err(e) => {
            tracing::warn!("Could not load preferences: {}", e);
            return None;
        }
    };
    let name = prefs.preferred_model?;
    choices.iter().find(|m| m.name == name).cloned()
}
