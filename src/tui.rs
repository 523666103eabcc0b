//! Ratatui rendering and key mapping for the two-pane viewer.
//!
//! Rendering is a pure read of a [`Session`]; nothing here mutates state.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::layout::{Alignment, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use crate::nav::{Action, Pane, ProgramState, Session};
use crate::seek::is_active_at;
use crate::store::VariableHistory;

/// Maps a key press to an operator action. Unbound keys return `None`.
pub fn key_action(key: KeyEvent) -> Option<Action> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('r' | 'R') => Some(Action::Resume),
            KeyCode::Char('c' | 'C') => Some(Action::Quit),
            _ => None,
        };
    }

    match key.code {
        KeyCode::Esc => Some(Action::Quit),
        KeyCode::Up => Some(Action::MoveUp),
        KeyCode::Down => Some(Action::MoveDown),
        KeyCode::Left => Some(Action::MoveLeft),
        KeyCode::Right => Some(Action::MoveRight),
        KeyCode::Char(' ') => Some(Action::SwitchPane),
        _ => None,
    }
}

pub fn status_line(state: &ProgramState) -> String {
    let (status, extra) = if state.realtime {
        ("Running".to_string(), "")
    } else {
        (format!("Frozen @ {:.2}s", state.timecursor_secs()), ", [ctrl-r] resume")
    };
    match state.focused_pane {
        Pane::Buffer => format!("{status}. [space] switch pane, [up/down] scroll{extra}"),
        Pane::Variables => format!(
            "{status}. [space] switch pane, [up/down] select variable, [left/right] select frame{extra}"
        ),
    }
}

/// Draws the buffer on the left half, variables on the right and the status
/// bar under whichever pane has focus.
pub fn render(frame: &mut Frame<'_>, session: &Session) {
    let area = frame.area();
    if area.width == 0 || area.height == 0 {
        return;
    }

    let half = area.width / 2;
    let body_height = area.height - 1;
    let right_x = half.saturating_add(1).min(area.width);

    let buffer_area = Rect { x: area.x, y: area.y, width: half, height: body_height };
    let divider_area =
        Rect { x: area.x + half.min(area.width - 1), y: area.y, width: 1, height: body_height };
    let variables_area = Rect {
        x: area.x + right_x,
        y: area.y,
        width: area.width - right_x,
        height: body_height,
    };

    render_buffer(frame, session, buffer_area);
    frame.render_widget(Block::default().borders(Borders::LEFT), divider_area);
    render_variables(frame, session, variables_area);
    render_status(frame, session.state(), area, half);
}

fn render_buffer(frame: &mut Frame<'_>, session: &Session, area: Rect) {
    if area.is_empty() {
        return;
    }
    let state = session.state();
    let buffer = session.store().buffer();
    let end = buffer
        .len()
        .min(state.selected_buffer_line.saturating_add(1))
        .min(state.buffer_offset.saturating_add(usize::from(area.height)));

    let lines: Vec<Line> = (state.buffer_offset..end)
        .filter_map(|line| buffer.get(line))
        .map(|entry| Line::raw(entry.text.as_str()))
        .collect();
    frame.render_widget(Paragraph::new(lines), area);
}

fn render_variables(frame: &mut Frame<'_>, session: &Session, area: Rect) {
    if area.is_empty() {
        return;
    }
    let state = session.state();
    for (idx, history) in session.store().registry().iter().enumerate() {
        let Ok(row) = u16::try_from(idx) else {
            break;
        };
        if row >= area.height {
            break;
        }
        let row_area = Rect { x: area.x, y: area.y + row, width: area.width, height: 1 };
        let marker = if idx == state.selected_variable_index { ">" } else { " " };
        let mut spans = vec![Span::raw(marker), Span::raw(history.name())];

        if state.realtime || is_active_at(history, state.timecursor) {
            if let Some(value) = history.focused_value() {
                spans.push(Span::raw(" "));
                spans.push(Span::raw(value));
            }
            frame.render_widget(Paragraph::new(Line::from(spans)), row_area);
            frame.render_widget(
                Paragraph::new(focus_position(history)).alignment(Alignment::Right),
                row_area,
            );
        } else {
            frame.render_widget(Paragraph::new(Line::from(spans)), row_area);
        }
    }
}

fn render_status(frame: &mut Frame<'_>, state: &ProgramState, area: Rect, half: u16) {
    let offset = match state.focused_pane {
        Pane::Buffer => 0,
        Pane::Variables => half.saturating_add(1).min(area.width),
    };
    let status_area = Rect {
        x: area.x + offset,
        y: area.y + area.height - 1,
        width: half.min(area.width - offset),
        height: 1,
    };
    if status_area.is_empty() {
        return;
    }
    let style = Style::default().add_modifier(Modifier::REVERSED);
    frame.render_widget(Paragraph::new(status_line(state)).style(style), status_area);
}

fn focus_position(history: &VariableHistory) -> String {
    format!("{}/{}", history.focus() + 1, history.len())
}
