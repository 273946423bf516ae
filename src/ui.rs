use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

use nest_assistant::PanelEntry;

use crate::app::{App, InputMode};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }
    Line::from(spans)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, body_area);
    render_footer(app, frame, footer_area);

    if app.show_ticket_input {
        render_ticket_input(app, frame, area);
    } else if app.show_model_picker {
        render_model_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let config = app.chat.assistant().config();
    let store = config
        .store_name
        .clone()
        .or_else(|| config.store_slug.clone())
        .unwrap_or_default();

    let mut spans = vec![
        Span::styled(" NestBot ", Style::default().fg(Color::Cyan).bold()),
    ];
    if !store.is_empty() {
        spans.push(Span::styled(format!(" {} ", store), Style::default().fg(Color::White)));
    }
    if let Some(user) = &config.current_user {
        if !user.name.is_empty() {
            spans.push(Span::styled(
                format!(" [{}] ", user.name),
                Style::default().fg(Color::Gray),
            ));
        }
    }
    spans.push(Span::styled(
        format!("v{}", env!("CARGO_PKG_VERSION")),
        Style::default().fg(Color::DarkGray),
    ));

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = match app.input_mode {
        InputMode::Normal => " NORMAL ",
        InputMode::Editing => " ASK ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut spans = vec![Span::styled(mode_text, mode_style)];

    let (access_text, access_color) = if app.chat.ticket_access() {
        (" tickets on ", Color::Green)
    } else {
        (" tickets off ", Color::Red)
    };
    spans.push(Span::styled(access_text, Style::default().fg(access_color)));
    if let Some(ticket) = app.chat.specific_ticket() {
        spans.push(Span::styled(
            format!(" {} ", ticket),
            Style::default().fg(Color::Magenta).bold(),
        ));
    }
    spans.push(Span::raw(" "));

    let hints: &[(&str, &str)] = match app.input_mode {
        InputMode::Editing => &[(" Enter ", " send "), (" Esc ", " normal ")],
        InputMode::Normal => &[
            (" i ", " ask "),
            (" m ", " model "),
            (" t ", " tickets "),
            (" l ", " load ticket "),
            (" c ", " clear ticket "),
            (" x ", " clear chat "),
            (" q ", " quit "),
        ],
    };
    for (key, label) in hints {
        spans.push(Span::styled(*key, key_style));
        spans.push(Span::styled(*label, label_style));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn role_line(label: &'static str, color: Color) -> Line<'static> {
    Line::from(Span::styled(
        label,
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    ))
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(area);

    app.chat_area = Some(chat_area);
    // Inner size minus borders, for scroll calculations
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(app.model_title());

    let entries = app.chat.panel().entries();
    let chat_text = if entries.is_empty() {
        Text::from(Span::styled(
            "Ask about a repair, a customer or a ticket... Type /help for commands.",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();
        for entry in entries {
            match entry {
                PanelEntry::User(text) => {
                    lines.push(role_line("You:", Color::Cyan));
                    lines.extend(text.lines().map(|l| Line::from(l.to_string())));
                }
                PanelEntry::Assistant(text) => {
                    lines.push(role_line("NestBot:", Color::Yellow));
                    lines.extend(text.lines().map(parse_markdown_line));
                }
                PanelEntry::System(text) => {
                    lines.push(Line::from(Span::styled(
                        text.clone(),
                        Style::default().fg(Color::Magenta).add_modifier(Modifier::ITALIC),
                    )));
                }
                PanelEntry::Thinking(_) => {
                    lines.push(role_line("NestBot:", Color::Yellow));
                    // Animated ellipsis: cycles through ".", "..", "..."
                    let dots = ".".repeat((app.animation_frame as usize) + 1);
                    lines.push(Line::from(Span::styled(
                        format!("Thinking{}", dots),
                        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                    )));
                }
            }
            lines.push(Line::default());
        }
        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    let input_border_color = if app.input_mode == InputMode::Editing {
        Color::Yellow
    } else {
        Color::DarkGray
    };
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(input_border_color))
        .title(" Message ");

    // Horizontal scroll keeps the cursor visible
    let inner_width = input_area.width.saturating_sub(2) as usize;
    let cursor_pos = app.query_cursor;
    let scroll_offset = if inner_width > 0 && cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };
    let visible_text: String = app
        .query_input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);
    frame.render_widget(input, input_area);

    if app.input_mode == InputMode::Editing && !app.show_ticket_input && !app.show_model_picker {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((input_area.x + cursor_x + 1, input_area.y + 1));
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(4));
    Rect::new(
        area.x + (area.width.saturating_sub(width)) / 2,
        area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    )
}

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let popup_area = centered(area, 60, app.available_models.len() as u16 + 2);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Select Model (Enter to select, Esc to cancel) ");

    let selected = app.chat.selected_model();
    let items: Vec<ListItem> = app
        .available_models
        .iter()
        .map(|model| {
            let style = if Some(model) == selected {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(" {} ({}) ", model.name, model.api)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.model_picker_state);
}

fn render_ticket_input(app: &App, frame: &mut Frame, area: Rect) {
    let popup_area = centered(area, 44, 5);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Load Ticket (Enter to load, Esc to cancel) ");
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let hint = Paragraph::new("Ticket number, e.g. T-12345")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(hint, Rect::new(inner.x, inner.y, inner.width, 1));

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    frame.render_widget(
        Paragraph::new(app.ticket_input.as_str()).style(Style::default().fg(Color::Cyan)),
        input_area,
    );
    let cursor_x = app.ticket_input.chars().count().min(input_area.width as usize) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));
}
