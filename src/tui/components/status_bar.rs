use crate::app::{AppState, Popover};
use crate::config::BindingScope;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

/// Actions whose keys are hinted on the right, per scope
const GLOBAL_HINTS: [(&str, &str); 4] = [
    ("open_search", "find"),
    ("toggle_maximize", "max"),
    ("open_help", "help"),
    ("quit", "quit"),
];
const SEARCH_HINTS: [(&str, &str); 3] = [
    ("search_next", "next"),
    ("search_previous", "prev"),
    ("close_popover", "close"),
];
const HELP_HINTS: [(&str, &str); 1] = [("close_popover", "close")];

pub fn render(frame: &mut Frame, area: Rect, state: &AppState) {
    let (badge, badge_bg) = match &state.session.popover {
        Some(Popover::Search(_)) => (" SEARCH ".to_string(), Color::Yellow),
        Some(Popover::Help) => (" HELP ".to_string(), Color::Magenta),
        None => {
            let title = state
                .layout
                .focused()
                .and_then(|id| state.layout.panel(id))
                .map(|panel| format!(" {} ", panel.title()))
                .unwrap_or_else(|| " gridterm ".to_string());
            (title, Color::Blue)
        }
    };

    let mut left_text = vec![
        Span::styled(
            badge,
            Style::default()
                .fg(Color::White)
                .bg(badge_bg)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
    ];
    if let Some(message) = state.session.status_message() {
        left_text.push(Span::styled(
            message.to_string(),
            Style::default().fg(Color::Yellow),
        ));
    }

    let scope = state.session.binding_scope();
    let hints: &[(&str, &str)] = match scope {
        BindingScope::Global => &GLOBAL_HINTS,
        BindingScope::Search => &SEARCH_HINTS,
        BindingScope::Help => &HELP_HINTS,
    };
    let mut right_text = Vec::new();
    for (action, label) in hints {
        let Some(key) = state.session.keybindings.key_for(scope, action) else {
            continue;
        };
        right_text.push(Span::styled(
            format!("[{}]", key),
            Style::default().fg(Color::Cyan),
        ));
        right_text.push(Span::styled(
            format!(" {}  ", label),
            Style::default().fg(Color::Gray),
        ));
    }

    let left_len: usize = left_text.iter().map(|s| s.content.chars().count()).sum();
    let right_len: usize = right_text.iter().map(|s| s.content.chars().count()).sum();
    let padding = area.width.saturating_sub(left_len as u16 + right_len as u16);

    let mut spans = left_text;
    spans.push(Span::raw(" ".repeat(padding as usize)));
    spans.extend(right_text);

    let paragraph = Paragraph::new(Line::from(spans))
        .style(Style::default().bg(Color::DarkGray).fg(Color::White));
    frame.render_widget(paragraph, area);
}
