use std::time::Instant;

use anyhow::Result;
use ratatui::layout::Rect;
use tracing::{debug, info, warn};

use super::handler::process_action;
use super::input::map_event;
use super::{Action, AppState, SessionContext};
use crate::config::{BindingScope, KeybindingConfig, SessionConfig};
use crate::pty::StreamManager;
use crate::tui;
use crate::tui::effects::{EffectsManager, FRAME_INTERVAL};
use crate::tui::event::{EventHandler, LoopEvent};
use crate::tui::ui::{self, ScreenAreas};

/// Stream events folded into one loop turn before redrawing
const STREAM_BATCH: usize = 64;

pub async fn run_tui(config: SessionConfig, keybindings: KeybindingConfig) -> Result<()> {
    // Initialize terminal
    let mut terminal = tui::init()?;

    let result = run_main_loop(&mut terminal, config, keybindings).await;

    // Restore terminal
    tui::restore()?;

    result
}

/// Bindings naming an action this build does not know are kept but inert.
fn warn_unknown_actions(keybindings: &KeybindingConfig) {
    for scope in [BindingScope::Global, BindingScope::Search, BindingScope::Help] {
        for name in keybindings.action_names(scope) {
            if Action::from_name(name).is_none() {
                warn!(?scope, action = name, "key bound to unknown action");
            }
        }
    }
}

fn screen_of(terminal: &tui::Terminal) -> Result<ScreenAreas> {
    let size = terminal.size()?;
    Ok(ScreenAreas::split(Rect::new(0, 0, size.width, size.height)))
}

async fn run_main_loop(
    terminal: &mut tui::Terminal,
    config: SessionConfig,
    keybindings: KeybindingConfig,
) -> Result<()> {
    warn_unknown_actions(&keybindings);

    let now = Instant::now();
    let mut events = EventHandler::new();
    let session = SessionContext::new(keybindings, config.terminal, config.instance_settings(), now);
    let mut state = AppState::new(
        &config,
        session,
        Box::new(StreamManager::new()),
        events.stream_sender(),
    );
    state.set_screen(screen_of(terminal)?, now);
    state.start_panels(now);
    info!(panels = state.layout.len(), pages = state.layout.page_count(), "session started");

    // Create effects manager for animations
    let mut effects = EffectsManager::new();

    loop {
        state.tick(Instant::now());
        if state.session.should_quit {
            break;
        }

        state.set_screen(screen_of(terminal)?, Instant::now());
        terminal.draw(|frame| ui::draw(frame, &mut state, &mut effects))?;
        state.after_draw();

        let mut deadline = state.next_deadline();
        if effects.has_active_effects() {
            let frame_due = Instant::now() + FRAME_INTERVAL;
            deadline = Some(deadline.map_or(frame_due, |d| d.min(frame_due)));
        }

        match events.next(deadline).await {
            LoopEvent::Input(event) => {
                let action = map_event(event, &state.session, state.focused_input_modes());
                process_action(&mut state, action, Instant::now())?;
            }
            LoopEvent::Stream(event) => {
                let now = Instant::now();
                state.handle_stream_event(event, now);
                for _ in 1..STREAM_BATCH {
                    let Some(event) = events.try_next_stream() else {
                        break;
                    };
                    state.handle_stream_event(event, now);
                }
            }
            LoopEvent::Timer => {}
        }
        state.drain_instance_events(Instant::now());
    }

    debug!("main loop finished");
    state.shutdown();
    Ok(())
}
