//! Render functions for the TUI.
//!
//! Lays out the tree panel, the search line and the status bar, then draws
//! any prompt or confirmation overlay on top.

use crate::app::{App, Mode, PendingDelete, Prompt};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use super::{categories, status};

/// Minimum terminal dimensions required for normal operation.
pub(super) const MIN_WIDTH: u16 = 40;
pub(super) const MIN_HEIGHT: u16 = 8;

/// Main render dispatch function.
pub(super) fn render(f: &mut Frame, app: &App) {
    let area = f.area();
    if area.width < 1 || area.height < 1 {
        return;
    }

    if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
        let msg = if area.height < 3 || area.width < 20 {
            Paragraph::new("Too small")
        } else {
            Paragraph::new(format!(
                "Terminal too small\n\nMinimum: {}x{}\nCurrent: {}x{}",
                MIN_WIDTH, MIN_HEIGHT, area.width, area.height
            ))
            .alignment(Alignment::Center)
        };
        f.render_widget(msg, area);
        return;
    }

    let show_search = matches!(app.mode, Mode::Search) || app.search.is_active();
    let search_height = if show_search { 1 } else { 0 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(search_height),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);

    if show_search {
        render_search_line(f, app, chunks[0]);
    }
    categories::render(f, app, chunks[1]);
    status::render(f, app, chunks[2]);

    match &app.mode {
        Mode::Prompt(prompt) => render_prompt_overlay(f, prompt),
        Mode::Confirm(pending) => render_confirm_overlay(f, pending),
        Mode::Browse | Mode::Search => {}
    }
}

fn render_search_line(f: &mut Frame, app: &App, area: Rect) {
    let cursor = if matches!(app.mode, Mode::Search) { "_" } else { "" };
    let state = if app.search.is_building() {
        " (indexing...)"
    } else {
        ""
    };
    let text = format!("/{}{}{}", app.search.query(), cursor, state);
    f.render_widget(
        Paragraph::new(text).style(Style::default().fg(Color::Yellow)),
        area,
    );
}

/// Centered rectangle of at most `width` x `height`.
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(4));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn render_overlay(f: &mut Frame, overlay: Rect, title: &str, text: String) {
    if overlay.width < 10 || overlay.height < 5 {
        return;
    }
    f.render_widget(Clear, overlay);
    let paragraph = Paragraph::new(text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(format!(" {title} ")),
        )
        .alignment(Alignment::Center);
    f.render_widget(paragraph, overlay);
}

fn render_prompt_overlay(f: &mut Frame, prompt: &Prompt) {
    let overlay = centered(f.area(), 60, 7);
    let text = format!("\n> {}_\n\n(Enter) Save  (Esc) Cancel", prompt.input);
    render_overlay(f, overlay, &prompt.title(), text);
}

fn render_confirm_overlay(f: &mut Frame, pending: &PendingDelete) {
    let overlay = centered(f.area(), 50, 7);
    let text = format!(
        "Delete \"{}\"?\n\nCategories with subcategories cannot be deleted.\n\n(y) Confirm  (n/Esc) Cancel",
        pending.name
    );
    render_overlay(f, overlay, "Confirm", text);
}
