use std::io;

use rag::Phase;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Margin, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap};
use ratatui::{Frame, Terminal};

use crate::app::{App, InputMode, OutputFocus, ScrollView, byte_offset};

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

fn inner_width(area: Rect) -> usize {
    area.width.saturating_sub(2) as usize
}

fn inner_height(area: Rect) -> usize {
    area.height.saturating_sub(2) as usize
}

fn line_count(text: &str) -> usize {
    text.lines().count().max(1)
}

/// First visible character of the input so the cursor stays on screen.
fn view_start(len: usize, cursor: usize, max_width: usize) -> usize {
    if len <= max_width {
        return 0;
    }
    let cursor = cursor.min(len);
    cursor.saturating_sub(max_width / 2).min(len - max_width)
}

fn visible_input(input: &str, cursor: usize, max_width: usize) -> (String, usize) {
    if max_width == 0 {
        return (String::new(), 0);
    }
    let len = input.chars().count();
    let start = view_start(len, cursor, max_width);
    let from = byte_offset(input, start);
    let to = byte_offset(input, start + max_width);
    let cursor_x = cursor.min(len).saturating_sub(start).min(max_width);
    (input[from..to].to_string(), cursor_x)
}

fn render_pane(frame: &mut Frame, area: Rect, title: String, text: String, view: &mut ScrollView) {
    let title_style = Style::default().fg(Color::Black).add_modifier(Modifier::BOLD);
    let block = Block::bordered()
        .title(title)
        .title_style(title_style)
        .border_style(Style::default().fg(Color::Black));

    view.fit(line_count(&text), inner_height(area));

    let paragraph = Paragraph::new(text)
        .style(Style::default().fg(Color::Blue))
        .scroll((view.scroll as u16, 0))
        .wrap(Wrap { trim: true })
        .block(block);
    frame.render_widget(paragraph, area);

    let mut scrollbar = ScrollbarState::new(view.content_len).position(view.scroll);
    let scrollbar_widget = Scrollbar::new(ScrollbarOrientation::VerticalRight)
        .track_style(Style::default().fg(Color::DarkGray))
        .thumb_style(Style::default().fg(Color::Blue));
    frame.render_stateful_widget(
        scrollbar_widget,
        area.inner(Margin {
            vertical: 1,
            horizontal: 0,
        }),
        &mut scrollbar,
    );
}

pub fn draw_ui(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> io::Result<()> {
    terminal.draw(|frame| {
        let title_style = Style::default().fg(Color::Black).add_modifier(Modifier::BOLD);
        let muted = Style::default().fg(Color::DarkGray);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(8),
                Constraint::Length(3),
                Constraint::Length(3),
            ])
            .split(frame.area());
        let output_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
            .split(chunks[1]);

        let loading = app.phase() == Phase::Querying;
        let status_title = match app.document_name() {
            Some(name) => format!("Portfolio Navigator: {}", name),
            None => "Portfolio Navigator".to_string(),
        };
        let status_text = if loading {
            format!("{} {}", SPINNER[app.spinner_idx], app.status)
        } else {
            app.status.clone()
        };
        let status = Paragraph::new(status_text)
            .style(Style::default().fg(Color::Green))
            .block(
                Block::bordered()
                    .title(status_title)
                    .title_style(title_style)
                    .border_style(muted),
            );
        frame.render_widget(status, chunks[0]);

        let focus_mark = |focus: OutputFocus| if app.output_focus == focus { " *" } else { "" };
        let context_title = format!("Retrieved context{}", focus_mark(OutputFocus::Context));
        let answer_title = format!("Answer{}", focus_mark(OutputFocus::Answer));
        let context_text = app
            .context_text
            .clone()
            .unwrap_or_else(|| "Document excerpts used for the answer appear here.".to_string());
        let answer_text = if loading {
            "Loading...".to_string()
        } else {
            app.answer_text.clone().unwrap_or_else(|| match app.input_mode {
                InputMode::Upload => "Type the path of a PDF file below and press Enter.".to_string(),
                InputMode::Search => "Type your question below and press Enter.".to_string(),
            })
        };

        render_pane(frame, output_chunks[0], context_title, context_text, &mut app.context_view);
        render_pane(frame, output_chunks[1], answer_title, answer_text, &mut app.answer_view);

        let input_title = match app.input_mode {
            InputMode::Upload => "Upload (PDF path)",
            InputMode::Search => "Search",
        };
        let input_block = Block::bordered()
            .title(input_title)
            .title_style(title_style)
            .border_style(muted);
        let (input_view, cursor_x) = visible_input(&app.input, app.cursor, inner_width(chunks[2]));
        let input = Paragraph::new(input_view).style(muted).block(input_block);
        frame.render_widget(input, chunks[2]);
        frame.set_cursor_position((chunks[2].x + 1 + cursor_x as u16, chunks[2].y + 1));

        let help_text = match app.input_mode {
            InputMode::Upload => {
                "Enter: Upload | Tab: Search | F3: Insights | Ctrl+O: Focus | Up/Down/PgUp/PgDn/Home/End: Scroll | Esc/Ctrl+C: Quit"
            }
            InputMode::Search => {
                "Enter: Search | Tab: Upload | F3: Insights | Ctrl+O: Focus | Up/Down/PgUp/PgDn/Home/End: Scroll | Esc/Ctrl+C: Quit"
            }
        };
        let help = Paragraph::new(help_text)
            .style(muted)
            .wrap(Wrap { trim: true })
            .block(
                Block::bordered()
                    .title("Controls")
                    .title_style(title_style)
                    .border_style(muted),
            );
        frame.render_widget(help, chunks[3]);
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_input_keeps_cursor_in_view() {
        let (view, x) = visible_input("short", 5, 20);
        assert_eq!(view, "short");
        assert_eq!(x, 5);

        let long = "abcdefghijklmnopqrstuvwxyz";
        let (view, x) = visible_input(long, 26, 10);
        assert_eq!(view, "qrstuvwxyz");
        assert_eq!(x, 10);

        let (view, x) = visible_input(long, 0, 10);
        assert_eq!(view, "abcdefghij");
        assert_eq!(x, 0);
    }

    #[test]
    fn visible_input_slices_on_char_boundaries() {
        let (view, x) = visible_input("Umsätze für Q3 öffnen", 21, 8);
        assert_eq!(view.chars().count(), 8);
        assert_eq!(x, 8);
    }
}
