use crate::app::AppState;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

const WIDTH: u16 = 44;
const HEIGHT: u16 = 3;

/// Box anchored to the top-right corner of `area`
fn popover_rect(area: Rect) -> Rect {
    let width = WIDTH.min(area.width);
    let height = HEIGHT.min(area.height);
    Rect::new(
        area.right().saturating_sub(width + 1).max(area.x),
        area.y.saturating_add(1).min(area.bottom().saturating_sub(height)),
        width,
        height,
    )
}

fn flag(label: &str, on: bool) -> Span<'static> {
    let style = if on {
        Style::default().fg(Color::Black).bg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Span::styled(format!("[{}]", label), style)
}

pub fn render(frame: &mut Frame, area: Rect, state: &AppState) {
    let Some(prompt) = state.session.search_prompt() else {
        return;
    };
    let rect = popover_rect(area);
    frame.render_widget(Clear, rect);

    let (border, input_style) = match prompt.matched {
        Some(false) => (Color::Red, Style::default().fg(Color::Red)),
        _ => (Color::Yellow, Style::default().fg(Color::White)),
    };

    let options = &prompt.options;
    let line = Line::from(vec![
        Span::styled("/ ", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
        Span::styled(prompt.input.clone(), input_style),
        Span::styled("▏", Style::default().fg(Color::Gray)),
        Span::raw(" "),
        flag("Aa", options.case_sensitive),
        flag("W", options.whole_word),
        flag(".*", options.regex),
    ]);

    let title = match prompt.matched {
        Some(false) => " Find: no match ",
        _ => " Find ",
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(Color::Black));

    frame.render_widget(Paragraph::new(line).block(block), rect);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn popover_hugs_the_top_right_corner() {
        let area = Rect::new(0, 1, 100, 40);
        assert_eq!(popover_rect(area), Rect::new(55, 2, 44, 3));

        let narrow = Rect::new(0, 1, 20, 2);
        let rect = popover_rect(narrow);
        assert!(narrow.contains(rect.as_position()));
        assert_eq!(rect.width, 20);
    }
}
