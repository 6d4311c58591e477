use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use tokio::sync::mpsc::UnboundedSender;

use crate::app::{App, ConnectionStatus, InputMode, MAX_INPUT_CHARS};
use crate::stream;
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent, tx: &UnboundedSender<AppEvent>) {
    match event {
        AppEvent::Key(key) => handle_key(app, key, tx),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => app.scroll_chat_to_bottom(),
        AppEvent::Tick => app.tick_animation(),
        AppEvent::FocusGained => spawn_health_probe(app, tx),
        AppEvent::Health(result) => {
            if app.apply_health(result) {
                spawn_models_fetch(app, tx);
            }
        }
        AppEvent::Models(result) => {
            // A failed models fetch keeps the current selection.
            if let Ok(models) = result {
                app.apply_models(models);
            }
        }
        AppEvent::Stream(event) => app.apply_stream_event(event),
        AppEvent::StreamClosed { skipped } => app.finish_stream(skipped),
        AppEvent::Completion(result) => app.apply_completion(result),
    }
}

/// Probe the health endpoint off the controller loop; the outcome rejoins
/// the loop as AppEvent::Health.
pub fn spawn_health_probe(app: &mut App, tx: &UnboundedSender<AppEvent>) {
    app.set_status(ConnectionStatus::Connecting, "Connecting...");
    let api = app.api.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        let _ = tx.send(AppEvent::Health(api.health().await));
    });
}

fn spawn_models_fetch(app: &App, tx: &UnboundedSender<AppEvent>) {
    let api = app.api.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        let _ = tx.send(AppEvent::Models(api.list_models().await));
    });
}

/// Validate the pending input and dispatch it on the configured path:
/// streaming by default, the bounded-retry single-shot call otherwise.
fn dispatch_send(app: &mut App, tx: &UnboundedSender<AppEvent>) {
    let message = match app.begin_send() {
        Some(message) => message,
        None => return,
    };

    let api = app.api.clone();
    let model = app.selected_model.clone();
    let tx = tx.clone();

    if app.use_streaming {
        tokio::spawn(stream::run(api, model, message, tx));
    } else {
        tokio::spawn(async move {
            let result = api.chat_with_retry(&model, &message).await;
            let _ = tx.send(AppEvent::Completion(result));
        });
    }
}

fn handle_key(app: &mut App, key: KeyEvent, tx: &UnboundedSender<AppEvent>) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    if app.show_model_picker {
        handle_model_picker(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key, tx),
        InputMode::Editing => handle_editing_mode(app, key, tx),
    }
}

fn handle_model_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.show_model_picker = false,
        KeyCode::Char('j') | KeyCode::Down => app.model_picker_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.model_picker_nav_up(),
        KeyCode::Enter => app.select_model(),
        _ => {}
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent, tx: &UnboundedSender<AppEvent>) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Enter the input box
        KeyCode::Char('i') | KeyCode::Enter => app.input_mode = InputMode::Editing,

        KeyCode::Char('t') => app.toggle_theme(),
        KeyCode::Char('m') => app.open_model_picker(),
        KeyCode::Char('r') => spawn_health_probe(app, tx),

        // Transcript scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(),
        KeyCode::Char('g') => app.chat_scroll = 0,
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent, tx: &UnboundedSender<AppEvent>) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => dispatch_send(app, tx),
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.input_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            if app.input.chars().count() < MAX_INPUT_CHARS {
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.insert(byte_pos, c);
                app.input_cursor += 1;
            }
        }
        _ => {}
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(),
        MouseEventKind::ScrollUp => app.scroll_up(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tokio::sync::mpsc;

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn test_char_to_byte_index_utf8() {
        let s = "héllo";
        assert_eq!(char_to_byte_index(s, 0), 0);
        assert_eq!(char_to_byte_index(s, 1), 1);
        assert_eq!(char_to_byte_index(s, 2), 3); // é is two bytes
        assert_eq!(char_to_byte_index(s, 99), s.len());
    }

    #[test]
    fn test_editing_inserts_at_cursor() {
        let mut app = App::new(Config::new());
        let (tx, _rx) = mpsc::unbounded_channel();

        for c in "héllo".chars() {
            handle_event(&mut app, key(KeyCode::Char(c)), &tx);
        }
        handle_event(&mut app, key(KeyCode::Left), &tx);
        handle_event(&mut app, key(KeyCode::Left), &tx);
        handle_event(&mut app, key(KeyCode::Char('x')), &tx);

        assert_eq!(app.input, "hélxlo");
        assert_eq!(app.input_cursor, 4);
    }

    #[test]
    fn test_backspace_is_utf8_safe() {
        let mut app = App::new(Config::new());
        let (tx, _rx) = mpsc::unbounded_channel();

        for c in "hé".chars() {
            handle_event(&mut app, key(KeyCode::Char(c)), &tx);
        }
        handle_event(&mut app, key(KeyCode::Backspace), &tx);

        assert_eq!(app.input, "h");
        assert_eq!(app.input_cursor, 1);
    }

    #[test]
    fn test_input_capped_at_limit() {
        let mut app = App::new(Config::new());
        let (tx, _rx) = mpsc::unbounded_channel();

        app.input = "x".repeat(MAX_INPUT_CHARS);
        app.input_cursor = MAX_INPUT_CHARS;
        handle_event(&mut app, key(KeyCode::Char('y')), &tx);

        assert_eq!(app.input.chars().count(), MAX_INPUT_CHARS);
    }

    #[tokio::test]
    async fn test_enter_with_blank_input_sends_nothing() {
        let mut app = App::new(Config::new());
        let (tx, _rx) = mpsc::unbounded_channel();

        handle_event(&mut app, key(KeyCode::Enter), &tx);

        assert!(app.messages.is_empty());
        assert!(!app.in_flight);
    }
}
