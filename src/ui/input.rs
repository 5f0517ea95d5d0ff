//! Input handling for the TUI.
//!
//! Routes each key press to the handler for the current [`Mode`].

use crate::app::{App, AppEvent, Mode};
use crossterm::event::{KeyCode, KeyModifiers};
use tokio::sync::mpsc;

use super::Action;

/// Rows moved by PageUp/PageDown.
const PAGE_STEP: isize = 10;

/// Main input dispatch function.
pub(super) fn handle_input(
    app: &mut App,
    code: KeyCode,
    modifiers: KeyModifiers,
    event_tx: &mpsc::Sender<AppEvent>,
) -> Action {
    // Raw mode swallows SIGINT, so Ctrl+C is handled here in every mode.
    if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
        return Action::Quit;
    }

    match app.mode {
        Mode::Browse => return handle_browse_input(app, code, event_tx),
        Mode::Search => handle_search_input(app, code, event_tx),
        Mode::Prompt(_) => handle_prompt_input(app, code, event_tx),
        Mode::Confirm(_) => handle_confirm_input(app, code, event_tx),
    }
    Action::Continue
}

fn handle_browse_input(app: &mut App, code: KeyCode, event_tx: &mpsc::Sender<AppEvent>) -> Action {
    match code {
        KeyCode::Char('q') => return Action::Quit,
        KeyCode::Char('j') | KeyCode::Down => app.move_selection(1),
        KeyCode::Char('k') | KeyCode::Up => app.move_selection(-1),
        KeyCode::PageDown => app.move_selection(PAGE_STEP),
        KeyCode::PageUp => app.move_selection(-PAGE_STEP),
        KeyCode::Char('g') | KeyCode::Home => app.select_first(),
        KeyCode::Char('G') | KeyCode::End => app.select_last(),
        KeyCode::Char('l') | KeyCode::Right | KeyCode::Enter | KeyCode::Char(' ') => {
            app.toggle_selected(event_tx)
        }
        KeyCode::Char('h') | KeyCode::Left => app.collapse_or_parent(),
        KeyCode::Char('c') => app.collapse_all(),
        KeyCode::Char('R') => app.refresh_selected(event_tx),
        KeyCode::Char('/') => app.begin_search(),
        KeyCode::Char('n') if app.search.is_active() => app.jump_to_match(true),
        KeyCode::Char('N') if app.search.is_active() => app.jump_to_match(false),
        KeyCode::Esc if app.search.is_active() => app.clear_search(event_tx),
        KeyCode::Char('a') => app.begin_add_child(),
        KeyCode::Char('A') => app.begin_add_root(),
        KeyCode::Char('r') => app.begin_rename(),
        KeyCode::Char('d') => app.begin_delete(),
        _ => {}
    }
    Action::Continue
}

fn handle_search_input(app: &mut App, code: KeyCode, event_tx: &mpsc::Sender<AppEvent>) {
    match code {
        KeyCode::Esc => app.clear_search(event_tx),
        KeyCode::Enter => app.finish_search(),
        KeyCode::Backspace => app.search_pop(event_tx),
        KeyCode::Down => app.move_selection(1),
        KeyCode::Up => app.move_selection(-1),
        KeyCode::Char(c) => app.search_push(c, event_tx),
        _ => {}
    }
}

fn handle_prompt_input(app: &mut App, code: KeyCode, event_tx: &mpsc::Sender<AppEvent>) {
    match code {
        KeyCode::Esc => app.cancel_modal(),
        KeyCode::Enter => app.submit_prompt(event_tx),
        KeyCode::Backspace => app.prompt_pop(),
        KeyCode::Char(c) => app.prompt_push(c),
        _ => {}
    }
}

fn handle_confirm_input(app: &mut App, code: KeyCode, event_tx: &mpsc::Sender<AppEvent>) {
    match code {
        KeyCode::Char('y') | KeyCode::Char('Y') => app.confirm_delete(event_tx),
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => app.cancel_modal(),
        _ => {}
    }
}
