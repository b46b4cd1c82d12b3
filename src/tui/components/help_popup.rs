use crate::app::AppState;
use crate::config::{BindingScope, KeybindingConfig};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

const SECTIONS: [(&str, BindingScope, &[(&str, &str)]); 2] = [
    (
        "Panels",
        BindingScope::Global,
        &[
            ("focus_left", "Focus panel to the left"),
            ("focus_right", "Focus panel to the right"),
            ("focus_up", "Focus panel above"),
            ("focus_down", "Focus panel below"),
            ("toggle_maximize", "Maximize / restore panel"),
            ("next_page", "Next page"),
            ("prev_page", "Previous page"),
            ("restart", "Restart panel"),
            ("close_panel", "Close panel"),
            ("clear", "Clear scrollback"),
            ("clear_all", "Clear screen and scrollback"),
            ("scroll_page_up", "Scroll up one page"),
            ("scroll_page_down", "Scroll down one page"),
            ("scroll_top", "Scroll to top"),
            ("scroll_bottom", "Scroll to live output"),
            ("copy_selection", "Copy selection"),
            ("open_search", "Find in panel"),
            ("quit", "Quit"),
        ],
    ),
    (
        "Find",
        BindingScope::Search,
        &[
            ("search_next", "Next match"),
            ("search_previous", "Previous match"),
            ("search_first", "First match"),
            ("search_last", "Last match"),
            ("toggle_case_sensitive", "Toggle case sensitivity"),
            ("toggle_whole_word", "Toggle whole word"),
            ("toggle_regex", "Toggle regex"),
            ("search_history", "Recall previous search"),
            ("close_popover", "Close"),
        ],
    ),
];

fn help_lines(keybindings: &KeybindingConfig) -> Vec<Line<'static>> {
    let mut lines = vec![
        Line::from(Span::styled(
            "gridterm - paged terminal grid",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];

    for (title, scope, entries) in SECTIONS {
        lines.push(Line::from(Span::styled(
            title,
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )));
        for (action, description) in entries {
            let Some(key) = keybindings.key_for(scope, action) else {
                continue;
            };
            lines.push(Line::from(vec![
                Span::styled(format!("  {:<16}", key), Style::default().fg(Color::Cyan)),
                Span::raw(*description),
            ]));
        }
        lines.push(Line::from(""));
    }

    lines.push(Line::from(Span::styled(
        "Mouse",
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(vec![
        Span::styled(format!("  {:<16}", "Drag"), Style::default().fg(Color::Cyan)),
        Span::raw("Select text"),
    ]));
    lines.push(Line::from(vec![
        Span::styled(format!("  {:<16}", "Wheel"), Style::default().fg(Color::Cyan)),
        Span::raw("Scroll history"),
    ]));
    lines.push(Line::from(""));

    let close = keybindings
        .key_for(BindingScope::Help, "close_popover")
        .unwrap_or_else(|| "Esc".to_string());
    lines.push(Line::from(Span::styled(
        format!("Press {} to close", close),
        Style::default().fg(Color::DarkGray),
    )));
    lines
}

pub fn render(frame: &mut Frame, state: &AppState) {
    let area = centered_rect(60, 70, frame.area());

    // Clear the background
    frame.render_widget(Clear, area);

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .style(Style::default().bg(Color::Black));

    let paragraph = Paragraph::new(help_lines(&state.session.keybindings))
        .block(block)
        .alignment(Alignment::Left);

    frame.render_widget(paragraph, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(lines: &[Line]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    #[test]
    fn lists_bound_keys_from_the_active_config() {
        let lines = text(&help_lines(&KeybindingConfig::default()));
        assert!(lines.iter().any(|l| l.contains("Ctrl-f") && l.contains("Find in panel")));
        assert!(lines.iter().any(|l| l.contains("Tab") && l.contains("Recall previous search")));
        assert_eq!(lines.last().map(String::as_str), Some("Press Enter to close"));
    }
}
