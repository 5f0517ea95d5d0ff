use crate::app::{App, Mode};
use ratatui::{
    layout::Rect,
    style::{Color, Style},
    widgets::Paragraph,
    Frame,
};
use std::borrow::Cow;

/// Render the status bar: the latest message, or key hints for the current mode.
pub fn render(f: &mut Frame, app: &App, area: Rect) {
    if area.width < 1 || area.height < 1 {
        return;
    }

    let text: Cow<'_, str> = if let Some((msg, _)) = &app.status_message {
        Cow::Borrowed(msg.as_ref())
    } else {
        match app.mode {
            Mode::Search => Cow::Borrowed("Type to search | ESC clear | ENTER keep filter"),
            Mode::Prompt(_) => Cow::Borrowed("ENTER save | ESC cancel"),
            Mode::Confirm(_) => Cow::Borrowed("(y) delete | (n/ESC) cancel"),
            Mode::Browse if app.search.is_active() => {
                Cow::Borrowed("[n/N]next/prev match [/]edit search [ESC]clear search [q]uit")
            }
            Mode::Browse => Cow::Borrowed(
                "[enter]toggle [h]collapse [c]ollapse all [/]search [a/A]dd [r]ename [d]elete [R]efresh [q]uit",
            ),
        }
    };

    let style = Style::default().bg(Color::DarkGray).fg(Color::White);
    f.render_widget(Paragraph::new(text).style(style), area);
}
