use crate::app::AppState;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

/// Columns between two tabs
const SEPARATOR: &str = " ";

fn label(page: usize, unseen: bool) -> String {
    if unseen {
        format!(" {}* ", page + 1)
    } else {
        format!(" {} ", page + 1)
    }
}

fn labels(state: &AppState) -> Vec<String> {
    (0..state.layout.page_count())
        .map(|page| {
            let unseen = page != state.layout.current_page() && state.layout.page_has_unseen(page);
            label(page, unseen)
        })
        .collect()
}

/// Page whose tab covers screen column `x`
pub fn tab_at(state: &AppState, x: u16) -> Option<usize> {
    let mut start = state.screen().tabs.x;
    for (page, label) in labels(state).iter().enumerate() {
        let end = start.saturating_add(label.chars().count() as u16);
        if (start..end).contains(&x) {
            return Some(page);
        }
        start = end.saturating_add(SEPARATOR.len() as u16);
    }
    None
}

pub fn render(frame: &mut Frame, area: Rect, state: &AppState) {
    let current = state.layout.current_page();
    let mut spans = Vec::new();

    for (page, label) in labels(state).into_iter().enumerate() {
        let style = if page == current {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else if label.contains('*') {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::Gray)
        };
        if page > 0 {
            spans.push(Span::raw(SEPARATOR));
        }
        spans.push(Span::styled(label, style));
    }

    let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(paragraph, area);
}
