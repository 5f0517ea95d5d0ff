use crate::app::{App, SPINNER_FRAMES};
use crate::tree::{Affordance, TreeRow};
use crate::util::{strip_control_chars, truncate_to_width};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState},
    Frame,
};

const SPINNER: [char; SPINNER_FRAMES] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

/// Render the category tree panel.
pub fn render(f: &mut Frame, app: &App, area: Rect) {
    if area.width < 3 || area.height < 3 {
        return;
    }

    let style_selected = Style::default().bg(Color::DarkGray).fg(Color::White);
    let style_match = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD);
    let style_count = Style::default().fg(Color::DarkGray);

    // Borders take two columns
    let inner_width = usize::from(area.width.saturating_sub(2));
    let spinner = SPINNER[app.spinner_frame % SPINNER_FRAMES];

    let items: Vec<ListItem> = app
        .rows()
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let base = if row.highlighted {
                style_match
            } else {
                Style::default()
            };
            let style = if i == app.selected_index() {
                style_selected.patch(base)
            } else {
                base
            };

            let prefix = format!("{}{} ", "  ".repeat(row.depth), marker(row, spinner));
            let room = inner_width.saturating_sub(prefix.chars().count());
            let name = strip_control_chars(&row.name);

            let mut spans = Vec::with_capacity(3);
            spans.push(Span::styled(prefix, style));
            spans.push(Span::styled(truncate_to_width(&name, room).into_owned(), style));
            if row.product_count > 0 {
                spans.push(Span::styled(format!(" ({})", row.product_count), style_count));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let title = if app.tree.roots().is_none() && app.tree.loading_count() > 0 {
        format!(" Categories {spinner} ")
    } else {
        " Categories ".to_string()
    };

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(title),
        )
        .highlight_style(Style::default());

    let selected = (!app.rows().is_empty()).then_some(app.selected_index());
    let mut state = ListState::default().with_selected(selected);
    f.render_stateful_widget(list, area, &mut state);
}

/// Expand/collapse marker, replaced by the spinner while children load.
fn marker(row: &TreeRow, spinner: char) -> char {
    if row.loading {
        return spinner;
    }
    match row.affordance {
        Affordance::Leaf => ' ',
        Affordance::Collapsed => '▸',
        Affordance::Expanded => '▾',
    }
}
