use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, InputMode};
use crate::location::Location;
use crate::transcript::{Sender, TurnAudio};

pub fn render(app: &mut App, frame: &mut Frame) {
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let backend = if app.backend_online {
        Span::styled("● online", Style::default().fg(Color::Green))
    } else {
        Span::styled("● offline", Style::default().fg(Color::Red))
    };

    let location = match app.location.last_known() {
        Location::Known(c) => Span::styled(
            format!("{:.4}, {:.4}", c.latitude, c.longitude),
            Style::default().fg(Color::DarkGray),
        ),
        Location::Unknown => {
            Span::styled("location unknown", Style::default().fg(Color::DarkGray))
        }
    };

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            " Fuel Agent ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        backend,
        Span::raw("  "),
        location,
    ]))
    .block(Block::default().borders(Borders::ALL));

    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Inner size minus borders, needed for wrap and scroll math
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let mut lines: Vec<Line> = Vec::new();
    for turn in app.transcript.turns() {
        match turn.sender {
            Sender::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
            }
            Sender::Agent => {
                lines.push(Line::from(Span::styled(
                    "Agent:",
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                )));
            }
        }
        for line in turn.text.lines() {
            lines.push(Line::from(line.to_string()));
        }
        if let Some(TurnAudio::Reply(_)) = turn.audio {
            lines.push(Line::from(Span::styled(
                "[spoken reply received]",
                Style::default().fg(Color::DarkGray),
            )));
        }
        lines.push(Line::default());
    }

    if app.is_sending() {
        lines.push(Line::from(Span::styled(
            "Agent:",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Typing{}", dots),
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        )));
    }

    app.total_chat_lines = wrapped_line_count(&lines, app.chat_width);
    if app.follow_chat {
        app.chat_scroll = app.total_chat_lines.saturating_sub(app.chat_height);
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title(" Conversation "))
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

/// Estimate how many terminal rows the chat occupies after wrapping, so
/// follow-mode can pin the viewport to the newest turn.
fn wrapped_line_count(lines: &[Line], width: u16) -> u16 {
    if width == 0 {
        return 0;
    }
    let width = width as usize;
    let mut count: usize = 0;
    for line in lines {
        let len = line.width();
        count += 1 + len.saturating_sub(1) / width;
    }
    count.min(u16::MAX as usize) as u16
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let (text, cursor, title, color) = match app.input_mode {
        InputMode::VoicePrompt => (
            app.voice_input.as_str(),
            app.voice_input.chars().count(),
            " Voice clip (Enter to send, Esc to cancel) ",
            Color::Magenta,
        ),
        InputMode::Editing => (
            app.input.as_str(),
            app.cursor,
            " Message (Enter to send, Esc to stop typing) ",
            Color::Yellow,
        ),
        InputMode::Normal => (
            app.input.as_str(),
            app.cursor,
            " Message (i to type) ",
            Color::DarkGray,
        ),
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .title(title);

    // Horizontal scroll keeps the cursor visible in a narrow box
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor >= inner_width {
        cursor - inner_width + 1
    } else {
        0
    };

    let visible_text: String = text.chars().skip(scroll_offset).take(inner_width).collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    if app.input_mode != InputMode::Normal {
        let cursor_x = (cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let text = if let Some(notice) = &app.notice {
        Line::from(Span::styled(
            format!(" {}", notice),
            Style::default().fg(Color::Magenta),
        ))
    } else {
        let mut hints = String::from(" i type  n new chat  j/k scroll  q quit");
        if app.voice_enabled {
            hints.push_str("  v voice clip");
        }
        Line::from(Span::styled(hints, Style::default().fg(Color::DarkGray)))
    };

    frame.render_widget(Paragraph::new(text), area);
}
