use chrono::Local;
use ratatui::widgets::ListState;

use crate::api::{is_connect_error, ApiClient, ChatResponse, HealthResponse};
use crate::config::{Config, DEFAULT_API_BASE_URL, DEFAULT_MODEL};
use crate::stream::StreamEvent;

pub const MAX_INPUT_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

/// Model and server timestamp attached to a completed assistant reply.
#[derive(Debug, Clone)]
pub struct MessageMeta {
    pub model: String,
    pub timestamp: String,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: ChatRole,
    pub content: String,
    pub metadata: Option<MessageMeta>,
    pub timestamp: String,
    /// Styled as an inline error instead of normal reply text.
    pub failed: bool,
}

impl Message {
    fn user(content: String) -> Self {
        Self {
            role: ChatRole::User,
            content,
            metadata: None,
            timestamp: Local::now().to_rfc3339(),
            failed: false,
        }
    }

    /// Empty assistant message the stream writes into.
    fn assistant_placeholder() -> Self {
        Self {
            role: ChatRole::Assistant,
            content: String::new(),
            metadata: None,
            timestamp: Local::now().to_rfc3339(),
            failed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Error,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn from_name(name: &str) -> Self {
        match name {
            "light" => Theme::Light,
            _ => Theme::Dark,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Conversation state (append-only; the tail is mutated while streaming)
    pub messages: Vec<Message>,
    pub in_flight: bool,

    // Input state
    pub input: String,
    pub input_cursor: usize, // char position in input

    // Connection state
    pub status: ConnectionStatus,
    pub status_message: String,

    // Model state
    pub selected_model: String,
    pub available_models: Vec<String>,
    pub show_model_picker: bool,
    pub model_picker_state: ListState,

    // Candidates from chunk events, attached as metadata on done
    stream_model: Option<String>,
    stream_timestamp: Option<String>,

    // Malformed stream lines skipped so far (surfaced in the footer)
    pub skipped_lines: usize,

    // Chat scrolling (heights/widths updated during render)
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub total_chat_lines: u16,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    pub theme: Theme,
    /// When false, sends go through the non-streaming retry path.
    pub use_streaming: bool,

    pub api: ApiClient,
}

impl App {
    pub fn new(config: Config) -> Self {
        let base_url = config
            .api_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let selected_model = config
            .default_model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let theme = Theme::from_name(config.theme.as_deref().unwrap_or("dark"));

        Self {
            should_quit: false,
            input_mode: InputMode::Editing,

            messages: Vec::new(),
            in_flight: false,

            input: String::new(),
            input_cursor: 0,

            status: ConnectionStatus::Connecting,
            status_message: "Connecting...".to_string(),

            selected_model,
            available_models: Vec::new(),
            show_model_picker: false,
            model_picker_state: ListState::default(),

            stream_model: None,
            stream_timestamp: None,

            skipped_lines: 0,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            total_chat_lines: 0,

            animation_frame: 0,

            theme,
            use_streaming: config.stream.unwrap_or(true),

            api: ApiClient::new(&base_url),
        }
    }

    pub fn set_status(&mut self, status: ConnectionStatus, message: &str) {
        self.status = status;
        self.status_message = message.to_string();
    }

    /// Validate and record a send. Returns the message text to dispatch, or
    /// None when the input is blank or another request is in flight.
    pub fn begin_send(&mut self) -> Option<String> {
        let message = self.input.trim().to_string();
        if message.is_empty() || self.in_flight {
            return None;
        }

        self.messages.push(Message::user(message.clone()));
        self.messages.push(Message::assistant_placeholder());

        self.input.clear();
        self.input_cursor = 0;
        self.in_flight = true;
        self.stream_model = None;
        self.stream_timestamp = None;
        self.scroll_chat_to_bottom();

        Some(message)
    }

    /// Apply one decoded stream event to the in-progress reply. Events
    /// arriving after the response was finalized or aborted are dropped.
    pub fn apply_stream_event(&mut self, event: StreamEvent) {
        if !self.in_flight {
            return;
        }

        match event {
            StreamEvent::Chunk {
                text,
                model,
                timestamp,
            } => {
                if let Some(model) = model {
                    self.stream_model = Some(model);
                }
                if let Some(timestamp) = timestamp {
                    self.stream_timestamp = Some(timestamp);
                }
                if let Some(message) = self.messages.last_mut() {
                    message.content.push_str(&text);
                }
                self.scroll_chat_to_bottom();
            }
            StreamEvent::Done => {
                let model = self
                    .stream_model
                    .take()
                    .unwrap_or_else(|| self.selected_model.clone());
                let timestamp = self
                    .stream_timestamp
                    .take()
                    .unwrap_or_else(|| Local::now().to_rfc3339());
                if let Some(message) = self.messages.last_mut() {
                    message.metadata = Some(MessageMeta { model, timestamp });
                }
                self.in_flight = false;
                self.scroll_chat_to_bottom();
            }
            StreamEvent::Error(error) => {
                if let Some(message) = self.messages.last_mut() {
                    message.content = format!("Error: {}", error);
                    message.failed = true;
                    message.metadata = None;
                }
                self.in_flight = false;
                self.scroll_chat_to_bottom();
            }
        }
    }

    /// The streaming task ended. Covers the server closing the connection
    /// without a done marker: the text stays, no metadata is attached.
    pub fn finish_stream(&mut self, skipped: usize) {
        self.skipped_lines += skipped;
        self.in_flight = false;
    }

    /// Result of the non-streaming fallback request.
    pub fn apply_completion(&mut self, result: anyhow::Result<ChatResponse>) {
        if !self.in_flight {
            return;
        }

        if let Some(message) = self.messages.last_mut() {
            match result {
                Ok(response) => {
                    message.content = response.response;
                    message.metadata = Some(MessageMeta {
                        model: response.model,
                        timestamp: response.timestamp,
                    });
                }
                Err(e) => {
                    message.content = format!("Error: {}", e);
                    message.failed = true;
                }
            }
        }
        self.in_flight = false;
        self.scroll_chat_to_bottom();
    }

    /// Apply a health probe outcome. Returns true when the models list
    /// should be refreshed.
    pub fn apply_health(&mut self, result: anyhow::Result<HealthResponse>) -> bool {
        match result {
            Ok(health) if health.status == "healthy" => {
                self.set_status(ConnectionStatus::Connected, "Connected");
                true
            }
            Ok(health) => {
                let label = if health.status.is_empty() {
                    "unavailable".to_string()
                } else {
                    health.status
                };
                self.set_status(ConnectionStatus::Error, &format!("API {}", label));
                false
            }
            Err(e) if is_connect_error(&e) => {
                self.set_status(ConnectionStatus::Offline, "Offline");
                false
            }
            Err(_) => {
                self.set_status(ConnectionStatus::Error, "API unreachable");
                false
            }
        }
    }

    /// Reconcile the selected model against the server's advertised list.
    pub fn apply_models(&mut self, models: Vec<String>) {
        if models.is_empty() {
            return;
        }
        if !models.contains(&self.selected_model) {
            self.selected_model = models[0].clone();
        }
        self.available_models = models;
    }

    pub fn toggle_theme(&mut self) {
        self.theme = self.theme.toggled();
        let _ = Config::save_theme(self.theme.name());
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.in_flight {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Chat scrolling
    pub fn scroll_down(&mut self) {
        if self.chat_scroll < self.total_chat_lines.saturating_sub(self.chat_height) {
            self.chat_scroll = self.chat_scroll.saturating_add(1);
        }
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    /// Pin the viewport to the newest content. Mirrors the transcript
    /// layout in ui.rs: role line, wrapped content, optional meta line,
    /// blank line per message.
    pub fn scroll_chat_to_bottom(&mut self) {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;

        for (i, message) in self.messages.iter().enumerate() {
            total_lines += 1; // Role line ("You:" or "AI:")

            let is_pending_tail =
                self.in_flight && i == self.messages.len() - 1 && message.content.is_empty();
            if is_pending_tail {
                total_lines += 1; // "Thinking..." indicator
            } else {
                for line in message.content.lines() {
                    total_lines +=
                        crate::ui::wrap_text_to_width(line, wrap_width).len().max(1) as u16;
                }
            }

            if message.metadata.is_some() {
                total_lines += 1; // Metadata footer line
            }
            total_lines += 1; // Blank line after message
        }

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        self.total_chat_lines = total_lines;
        if total_lines > visible_height {
            self.chat_scroll = total_lines.saturating_sub(visible_height);
        } else {
            self.chat_scroll = 0;
        }
    }

    // Model picker methods
    pub fn open_model_picker(&mut self) {
        if self.available_models.is_empty() {
            return;
        }
        let current = self
            .available_models
            .iter()
            .position(|m| *m == self.selected_model)
            .unwrap_or(0);
        self.model_picker_state.select(Some(current));
        self.show_model_picker = true;
    }

    pub fn model_picker_nav_down(&mut self) {
        let len = self.available_models.len();
        if len > 0 {
            let i = self.model_picker_state.selected().unwrap_or(0);
            self.model_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        if let Some(i) = self.model_picker_state.selected() {
            if let Some(model) = self.available_models.get(i) {
                self.selected_model = model.clone();
                self.show_model_picker = false;
                // Save to config
                let _ = Config::save_default_model(&self.selected_model);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::HealthResponse;

    fn test_app() -> App {
        App::new(Config::new())
    }

    fn chunk(text: &str) -> StreamEvent {
        StreamEvent::Chunk {
            text: text.to_string(),
            model: Some("mistral:latest".to_string()),
            timestamp: Some("2024-01-01T12:00:00".to_string()),
        }
    }

    #[test]
    fn test_blank_input_rejected() {
        let mut app = test_app();
        app.input = "   \n ".to_string();
        assert!(app.begin_send().is_none());
        assert!(app.messages.is_empty());
        assert!(!app.in_flight);
    }

    #[test]
    fn test_send_appends_user_and_placeholder() {
        let mut app = test_app();
        app.input = "  hello there  ".to_string();
        let sent = app.begin_send().unwrap();

        assert_eq!(sent, "hello there");
        assert_eq!(app.messages.len(), 2);
        assert_eq!(app.messages[0].role, ChatRole::User);
        assert_eq!(app.messages[0].content, "hello there");
        assert_eq!(app.messages[1].role, ChatRole::Assistant);
        assert!(app.messages[1].content.is_empty());
        assert!(app.in_flight);
        assert!(app.input.is_empty());
    }

    #[test]
    fn test_send_while_in_flight_is_noop() {
        let mut app = test_app();
        app.input = "first".to_string();
        app.begin_send().unwrap();

        app.input = "second".to_string();
        assert!(app.begin_send().is_none());
        assert_eq!(app.messages.len(), 2);
        assert_eq!(app.input, "second");
    }

    #[test]
    fn test_chunks_accumulate_then_done_finalizes() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.begin_send().unwrap();

        app.apply_stream_event(chunk("Hel"));
        app.apply_stream_event(chunk("lo"));
        app.apply_stream_event(StreamEvent::Done);

        let reply = app.messages.last().unwrap();
        assert_eq!(reply.content, "Hello");
        let meta = reply.metadata.as_ref().unwrap();
        assert_eq!(meta.model, "mistral:latest");
        assert_eq!(meta.timestamp, "2024-01-01T12:00:00");
        assert!(!app.in_flight);
    }

    #[test]
    fn test_done_finalizes_exactly_once() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.begin_send().unwrap();

        app.apply_stream_event(chunk("x"));
        app.apply_stream_event(StreamEvent::Done);
        // A stray second done (or late chunk) must not change anything.
        app.apply_stream_event(StreamEvent::Done);
        app.apply_stream_event(chunk("late"));

        let reply = app.messages.last().unwrap();
        assert_eq!(reply.content, "x");
        assert_eq!(app.messages.len(), 2);
    }

    #[test]
    fn test_error_event_aborts_with_inline_message() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.begin_send().unwrap();

        app.apply_stream_event(chunk("par"));
        app.apply_stream_event(StreamEvent::Error("model exploded".to_string()));

        let reply = app.messages.last().unwrap();
        assert!(reply.failed);
        assert_eq!(reply.content, "Error: model exploded");
        assert!(reply.metadata.is_none());
        assert!(!app.in_flight);
    }

    #[test]
    fn test_stream_closed_without_done_resets_in_flight() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.begin_send().unwrap();

        app.apply_stream_event(chunk("partial"));
        app.finish_stream(2);

        assert!(!app.in_flight);
        assert_eq!(app.skipped_lines, 2);
        let reply = app.messages.last().unwrap();
        assert_eq!(reply.content, "partial");
        assert!(reply.metadata.is_none());
    }

    #[test]
    fn test_completion_fills_reply_with_metadata() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.begin_send().unwrap();

        app.apply_completion(Ok(ChatResponse {
            response: "full answer".to_string(),
            model: "mistral:latest".to_string(),
            timestamp: "2024-01-01T12:00:00".to_string(),
        }));

        let reply = app.messages.last().unwrap();
        assert_eq!(reply.content, "full answer");
        assert!(reply.metadata.is_some());
        assert!(!app.in_flight);
    }

    #[test]
    fn test_completion_error_is_inline() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.begin_send().unwrap();

        app.apply_completion(Err(anyhow::anyhow!("HTTP 500")));

        let reply = app.messages.last().unwrap();
        assert!(reply.failed);
        assert_eq!(reply.content, "Error: HTTP 500");
        assert!(!app.in_flight);
    }

    #[test]
    fn test_healthy_probe_connects_and_refreshes_models() {
        let mut app = test_app();
        let refresh = app.apply_health(Ok(HealthResponse {
            status: "healthy".to_string(),
            message: "API is running".to_string(),
            ollama_status: "healthy".to_string(),
        }));

        assert!(refresh);
        assert_eq!(app.status, ConnectionStatus::Connected);
        assert_eq!(app.status_message, "Connected");
    }

    #[test]
    fn test_unhealthy_probe_reports_server_status() {
        let mut app = test_app();
        let refresh = app.apply_health(Ok(HealthResponse {
            status: "down".to_string(),
            message: String::new(),
            ollama_status: "unknown".to_string(),
        }));

        assert!(!refresh);
        assert_eq!(app.status, ConnectionStatus::Error);
        assert_eq!(app.status_message, "API down");
    }

    #[test]
    fn test_probe_failure_is_unreachable() {
        let mut app = test_app();
        app.apply_health(Err(anyhow::anyhow!("timed out")));
        assert_eq!(app.status, ConnectionStatus::Error);
        assert_eq!(app.status_message, "API unreachable");
    }

    #[test]
    fn test_model_reconciliation_falls_back_to_first() {
        let mut app = test_app();
        app.selected_model = "c".to_string();
        app.apply_models(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(app.selected_model, "a");
    }

    #[test]
    fn test_model_kept_when_advertised() {
        let mut app = test_app();
        app.selected_model = "b".to_string();
        app.apply_models(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(app.selected_model, "b");
    }

    #[test]
    fn test_empty_models_list_keeps_selection() {
        let mut app = test_app();
        app.selected_model = "c".to_string();
        app.apply_models(Vec::new());
        assert_eq!(app.selected_model, "c");
        assert!(app.available_models.is_empty());
    }

    #[test]
    fn test_theme_toggles() {
        assert_eq!(Theme::from_name("light").toggled(), Theme::Dark);
        assert_eq!(Theme::from_name("dark").toggled(), Theme::Light);
        assert_eq!(Theme::from_name("???"), Theme::Dark);
    }
}
