use std::time::Instant;

use crate::app::{AppState, Popover};
use crate::tui::components::{help_popup, page_tabs, panel_pane, search_popover, status_bar};
use crate::tui::effects::EffectsManager;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    widgets::Paragraph,
    Frame,
};

/// Fixed split of the screen: page tabs, the panel grid, the status line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScreenAreas {
    pub tabs: Rect,
    pub panels: Rect,
    pub status: Rect,
}

impl ScreenAreas {
    pub fn split(area: Rect) -> Self {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // Page tabs
                Constraint::Min(3),    // Panels
                Constraint::Length(1), // Status bar
            ])
            .split(area);
        Self {
            tabs: chunks[0],
            panels: chunks[1],
            status: chunks[2],
        }
    }
}

pub fn draw(frame: &mut Frame, state: &mut AppState, effects: &mut EffectsManager) {
    let screen = state.screen();
    let now = Instant::now();

    page_tabs::render(frame, screen.tabs, state);

    let rects = state.layout.panel_rects(screen.panels);
    if rects.is_empty() {
        let empty = Paragraph::new("No panels")
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(empty, screen.panels);
    }
    for (id, rect) in &rects {
        panel_pane::render(frame, *rect, state, *id, now);
    }

    status_bar::render(frame, screen.status, state);

    // Popovers sit on top of everything
    match &state.session.popover {
        Some(Popover::Search(_)) => search_popover::render(frame, screen.panels, state),
        Some(Popover::Help) => help_popup::render(frame, state),
        None => {}
    }

    let inner: Vec<Rect> = rects
        .iter()
        .filter_map(|(id, _)| state.content_rect(*id))
        .collect();
    effects.on_page(state.layout.current_page(), &inner);
    effects.process(frame);
}
