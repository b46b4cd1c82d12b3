use std::rc::Rc;
use std::time::Instant;

use ratatui::layout::Rect;
use tokio::sync::mpsc;

use super::{AppState, SessionContext};
use crate::config::{KeybindingConfig, SessionConfig, TerminalSettings};
use crate::layout::LayoutSettings;
use crate::models::InstanceConfig;
use crate::pty::mock::MockProvider;
use crate::terminal::InstanceSettings;
use crate::tui::ui::ScreenAreas;

/// Started app on a 100x42 screen with `panels` shells.
pub fn started_app(panels: Vec<InstanceConfig>, provider: Rc<MockProvider>) -> (AppState, Instant) {
    let now = Instant::now();
    let config = SessionConfig {
        layout: LayoutSettings::default(),
        panels,
        ..SessionConfig::default()
    };
    let session = SessionContext::new(
        KeybindingConfig::default(),
        TerminalSettings::default(),
        InstanceSettings::default(),
        now,
    );
    let (tx, _rx) = mpsc::channel(16);
    let mut state = AppState::new(&config, session, Box::new(provider), tx);
    state.set_screen(ScreenAreas::split(Rect::new(0, 0, 100, 42)), now);
    state.start_panels(now);
    (state, now)
}

pub fn shells(count: usize) -> (AppState, Instant) {
    started_app(vec![InstanceConfig::shell(); count], Rc::new(MockProvider::default()))
}
