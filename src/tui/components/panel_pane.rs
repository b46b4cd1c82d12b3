use std::time::Instant;

use crate::app::AppState;
use crate::layout::{Panel, PanelId};
use crate::terminal::{FlowControlled, TerminalInstance};
use ratatui::{
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
    Frame,
};
use tracing::warn;

pub fn render(frame: &mut Frame, area: Rect, state: &mut AppState, id: PanelId, now: Instant) {
    let ctx = state.render_context(id);
    let Some(panel) = state.layout.panel_mut(id) else {
        return;
    };
    let content = panel.content_area(area);

    let border_style = if panel.is_closing() || ctx.faded {
        Style::default().fg(Color::DarkGray)
    } else if ctx.focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::Gray)
    };

    let block = Block::default()
        .title(title(panel))
        .borders(Borders::ALL)
        .border_style(border_style);
    frame.render_widget(block, area);

    let Some(instance) = panel.instance.as_mut() else {
        let placeholder = Paragraph::new(vec![
            Line::from(""),
            Line::from(Span::styled(
                "starts when focused",
                Style::default().fg(Color::DarkGray),
            )),
        ])
        .alignment(Alignment::Center);
        frame.render_widget(placeholder, content);
        return;
    };

    if panel.surface.size() != (content.height, content.width) {
        panel.surface.resize(content.height, content.width);
        instance.request_full_render();
    }
    if let Some(patch) = instance.render_pass(&ctx, now) {
        if !panel.surface.apply(&patch) {
            warn!(%id, rows = patch.rows.len(), cols = patch.cols, "patch does not fit panel, repainting");
            instance.request_full_render();
        }
    }
    panel.surface.blit(frame.buffer_mut(), content);

    let grid = instance.grid();
    if !grid.at_live_edge() {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight);
        let mut scrollbar_state =
            ScrollbarState::new(grid.base_y()).position(grid.viewport_offset());
        frame.render_stateful_widget(scrollbar, area, &mut scrollbar_state);
    }

    if panel.config.metrics && area.height > content.height + 2 {
        let footer = Rect::new(content.x, content.bottom(), content.width, 1);
        let metrics = Paragraph::new(metrics_line(instance))
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(metrics, footer);
    }
}

fn title(panel: &mut Panel) -> Line<'static> {
    let kind = panel.config.kind;
    let mut spans = vec![Span::raw(format!(" {} {} ", kind.icon(), panel.title()))];

    if panel.is_maximized() {
        spans.push(Span::styled("[max] ", Style::default().fg(Color::Magenta)));
    }
    if let Some(instance) = panel.instance.as_mut() {
        let state = instance.state();
        if state.is_starting() || state.is_gone() {
            spans.push(Span::styled(
                format!("({}) ", state.name()),
                Style::default().fg(Color::Yellow),
            ));
        } else if instance.is_resize_deferred() {
            spans.push(Span::styled("(resizing) ", Style::default().fg(Color::Yellow)));
        } else if kind.is_shell() && !instance.at_prompt() {
            spans.push(Span::styled("● ", Style::default().fg(Color::Green)));
        }
    }
    spans.push(Span::styled(
        format!("[{}] ", kind.badge()),
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD),
    ));
    Line::from(spans)
}

fn metrics_line(instance: &TerminalInstance) -> Line<'static> {
    let stats = instance.stats();
    let flow = instance.flow_state();
    let run = instance.run();

    let mut text = format!(
        "{} B  {} flushes  {} {}",
        stats.bytes_received,
        stats.flushes,
        if run.is_running() { "up" } else { "ran" },
        run.duration_string()
    );
    if stats.lines_dropped > 0 {
        text.push_str(&format!("  {} filtered", stats.lines_dropped));
    }
    if stats.backfilled_lines > 0 {
        text.push_str(&format!("  {} backfilled", stats.backfilled_lines));
    }
    if run.restarts > 0 {
        text.push_str(&format!("  restarts {}", run.restarts));
    }

    let mut spans = vec![Span::raw(text)];
    if flow.paused {
        spans.push(Span::styled("  paused", Style::default().fg(Color::Red)));
    }
    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::test_support::{shells, started_app};
    use crate::models::InstanceConfig;
    use crate::pty::mock::MockProvider;
    use crate::pty::StreamEvent;
    use crate::terminal::DEFAULT_FLUSH_DEBOUNCE;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use std::rc::Rc;

    fn draw(state: &mut AppState, id: PanelId, now: Instant) -> ratatui::buffer::Buffer {
        let area = state.layout.panel_rects(state.screen().panels)[id.0].1;
        let mut terminal = Terminal::new(TestBackend::new(100, 42)).unwrap();
        terminal
            .draw(|frame| render(frame, area, state, id, now))
            .unwrap();
        terminal.backend().buffer().clone()
    }

    #[test]
    fn output_lands_inside_the_border() {
        let (mut state, now) = shells(1);
        let instance = state.focused_instance_mut().unwrap().id();
        state.handle_stream_event(StreamEvent::Data(instance, b"hello".to_vec()), now);
        let later = now + DEFAULT_FLUSH_DEBOUNCE;
        state.tick(later);

        let content = state.content_rect(PanelId(0)).unwrap();
        let buffer = draw(&mut state, PanelId(0), later);
        let word: String = (0..5)
            .map(|i| buffer[(content.x + i, content.y)].symbol().to_string())
            .collect();
        assert_eq!(word, "hello");
        assert_eq!(buffer[(0, 1)].fg, Color::Cyan);
    }

    #[test]
    fn unstarted_panel_shows_placeholder() {
        let lazy = InstanceConfig {
            on_demand: true,
            ..InstanceConfig::shell()
        };
        let (mut state, now) =
            started_app(vec![InstanceConfig::shell(), lazy], Rc::new(MockProvider::default()));
        assert!(state.layout.panel(PanelId(1)).unwrap().instance.is_none());

        let content = state.content_rect(PanelId(1)).unwrap();
        let buffer = draw(&mut state, PanelId(1), now);
        let row: String = (content.x..content.right())
            .map(|x| buffer[(x, content.y + 1)].symbol().to_string())
            .collect();
        assert!(row.contains("starts when focused"));
    }
}
