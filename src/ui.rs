use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph},
    Frame,
};

use crate::app::{App, ChatRole, ConnectionStatus, InputMode, Theme, MAX_INPUT_CHARS};

/// Color palette for the current theme.
struct Palette {
    text: Color,
    dim: Color,
    user: Color,
    assistant: Color,
    error: Color,
    border: Color,
}

fn palette(theme: Theme) -> Palette {
    match theme {
        Theme::Dark => Palette {
            text: Color::White,
            dim: Color::DarkGray,
            user: Color::Cyan,
            assistant: Color::Green,
            error: Color::Red,
            border: Color::DarkGray,
        },
        Theme::Light => Palette {
            text: Color::Black,
            dim: Color::Gray,
            user: Color::Blue,
            assistant: Color::Magenta,
            error: Color::LightRed,
            border: Color::Gray,
        },
    }
}

/// Wrap text to fit within a given width, returning multiple lines
/// Uses word boundaries for wrapping (doesn't break mid-word)
pub fn wrap_text_to_width(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current_line = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if current_len == 0 {
            current_line = word.to_string();
            current_len = word_len;
        } else if current_len + 1 + word_len <= width {
            current_line.push(' ');
            current_line.push_str(word);
            current_len += 1 + word_len;
        } else {
            lines.push(current_line);
            current_line = word.to_string();
            current_len = word_len;
        }
    }

    if current_len > 0 {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }

    lines
}

/// Pull the HH:MM:SS part out of an ISO-8601 timestamp for display.
fn format_clock(timestamp: &str) -> &str {
    match timestamp.split_once('T') {
        Some((_, time)) if time.len() >= 8 => &time[..8],
        _ => timestamp,
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();
    let colors = palette(app.theme);

    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, &colors, frame, header_area);
    render_chat(app, &colors, frame, chat_area);
    render_input(app, &colors, frame, input_area);
    render_footer(app, &colors, frame, footer_area);

    if app.show_model_picker {
        render_model_picker(app, &colors, frame, area);
    }
}

fn status_color(status: ConnectionStatus) -> Color {
    match status {
        ConnectionStatus::Connecting => Color::Yellow,
        ConnectionStatus::Connected => Color::Green,
        ConnectionStatus::Error => Color::Red,
        ConnectionStatus::Offline => Color::DarkGray,
    }
}

fn render_header(app: &App, colors: &Palette, frame: &mut Frame, area: Rect) {
    let status_span = Span::styled("● ", Style::default().fg(status_color(app.status)));

    let line = Line::from(vec![
        Span::styled(
            " Ollama Chat ",
            Style::default()
                .fg(colors.text)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled("│ ", Style::default().fg(colors.border)),
        status_span,
        Span::styled(app.status_message.clone(), Style::default().fg(colors.dim)),
        Span::styled(" │ ", Style::default().fg(colors.border)),
        Span::styled(
            app.selected_model.clone(),
            Style::default().fg(colors.user),
        ),
    ]);

    frame.render_widget(Paragraph::new(line), area);
}

/// Build the transcript as pre-wrapped lines. The line structure here must
/// stay in step with App::scroll_chat_to_bottom: role line, wrapped content
/// (or the typing indicator), optional metadata line, blank line.
fn transcript_lines<'a>(app: &App, colors: &Palette, width: usize) -> Vec<Line<'a>> {
    let mut lines: Vec<Line> = Vec::new();

    if app.messages.is_empty() {
        lines.push(Line::default());
        lines.push(Line::styled(
            "  Welcome! Type a message below and press Enter to chat.",
            Style::default().fg(colors.dim),
        ));
        lines.push(Line::styled(
            "  Keys: Esc normal mode, m models, t theme, r reconnect, q quit.",
            Style::default().fg(colors.dim),
        ));
        return lines;
    }

    let last = app.messages.len() - 1;
    for (i, message) in app.messages.iter().enumerate() {
        let (label, label_color) = match message.role {
            ChatRole::User => ("You:", colors.user),
            ChatRole::Assistant => ("AI:", colors.assistant),
        };
        lines.push(Line::styled(
            label.to_string(),
            Style::default()
                .fg(label_color)
                .add_modifier(Modifier::BOLD),
        ));

        let is_pending_tail = app.in_flight && i == last && message.content.is_empty();
        if is_pending_tail {
            let dots = ".".repeat(app.animation_frame as usize + 1);
            lines.push(Line::styled(
                format!("Thinking{}", dots),
                Style::default()
                    .fg(colors.dim)
                    .add_modifier(Modifier::ITALIC),
            ));
        } else {
            let content_style = if message.failed {
                Style::default().fg(colors.error)
            } else {
                Style::default().fg(colors.text)
            };
            for raw_line in message.content.lines() {
                for wrapped in wrap_text_to_width(raw_line, width) {
                    lines.push(Line::styled(wrapped, content_style));
                }
            }
        }

        if let Some(meta) = &message.metadata {
            lines.push(Line::styled(
                format!("Model: {}  {}", meta.model, format_clock(&meta.timestamp)),
                Style::default().fg(colors.dim),
            ));
        }
        lines.push(Line::default());
    }

    lines
}

fn render_chat(app: &mut App, colors: &Palette, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(colors.border))
        .title(" Conversation ");
    let inner = block.inner(area);

    // Record geometry for scroll calculations before building lines.
    app.chat_height = inner.height;
    app.chat_width = inner.width;

    let lines = transcript_lines(app, colors, inner.width as usize);
    app.total_chat_lines = lines.len() as u16;

    let paragraph = Paragraph::new(Text::from(lines)).scroll((app.chat_scroll, 0));

    frame.render_widget(block, area);
    frame.render_widget(paragraph, inner);
}

fn render_input(app: &App, colors: &Palette, frame: &mut Frame, area: Rect) {
    let border_color = match app.input_mode {
        InputMode::Editing => colors.user,
        InputMode::Normal => colors.border,
    };

    let char_count = app.input.chars().count();
    let title = format!(" Message ({}/{}) ", char_count, MAX_INPUT_CHARS);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);
    let inner = block.inner(area);

    // Keep the cursor visible: show the tail of the input when it overflows.
    let visible_width = inner.width.saturating_sub(1) as usize;
    let (display, cursor_col) = if app.input_cursor > visible_width {
        let skip = app.input_cursor - visible_width;
        let tail: String = app.input.chars().skip(skip).collect();
        (tail, visible_width)
    } else {
        (app.input.clone(), app.input_cursor)
    };

    frame.render_widget(block, area);
    frame.render_widget(
        Paragraph::new(display).style(Style::default().fg(colors.text)),
        inner,
    );

    if app.input_mode == InputMode::Editing && !app.show_model_picker {
        frame.set_cursor(inner.x + cursor_col as u16, inner.y);
    }
}

fn render_footer(app: &App, colors: &Palette, frame: &mut Frame, area: Rect) {
    let hint = match app.input_mode {
        InputMode::Editing => " Enter send │ Esc normal mode",
        InputMode::Normal => " i edit │ j/k scroll │ m models │ t theme │ r reconnect │ q quit",
    };

    let mut spans = vec![Span::styled(hint, Style::default().fg(colors.dim))];
    if app.skipped_lines > 0 {
        spans.push(Span::styled(
            format!(" │ {} malformed chunks skipped", app.skipped_lines),
            Style::default().fg(Color::Yellow),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_model_picker(app: &mut App, colors: &Palette, frame: &mut Frame, area: Rect) {
    let popup = centered_rect(50, 60, area);

    let items: Vec<ListItem> = app
        .available_models
        .iter()
        .map(|model| ListItem::new(model.clone()))
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(colors.user))
                .title(" Select Model (Enter to confirm, Esc to cancel) "),
        )
        .style(Style::default().fg(colors.text))
        .highlight_style(
            Style::default()
                .fg(colors.user)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_widget(Clear, popup);
    frame.render_stateful_widget(list, popup, &mut app.model_picker_state);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let [_, middle, _] = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .areas(area);

    let [_, center, _] = Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .areas(middle);

    center
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_respects_width() {
        let lines = wrap_text_to_width("one two three four five", 9);
        assert_eq!(lines, vec!["one two", "three", "four five"]);
    }

    #[test]
    fn test_wrap_empty_text_is_one_line() {
        assert_eq!(wrap_text_to_width("", 10), vec![String::new()]);
    }

    #[test]
    fn test_wrap_zero_width_passthrough() {
        assert_eq!(wrap_text_to_width("abc", 0), vec!["abc".to_string()]);
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock("2024-01-01T12:34:56.789"), "12:34:56");
        assert_eq!(format_clock("not a timestamp"), "not a timestamp");
    }
}
