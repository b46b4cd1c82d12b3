use std::time::Instant;

use anyhow::{Context, Result};
use ratatui::layout::Rect;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::session::SessionContext;
use crate::config::SessionConfig;
use crate::layout::{LayoutGrid, Panel, PanelId};
use crate::models::InstanceConfig;
use crate::pty::{InstanceId, StreamEvent, StreamProvider};
use crate::terminal::{
    FlowControlled, InputModes, InstanceEvent, RenderContext, Resizable, Spawner,
    TerminalInstance,
};
use crate::tui::ui::ScreenAreas;

/// Size used for instances started before the first draw
const FALLBACK_SIZE: (u16, u16) = (80, 24);

pub struct AppState {
    pub layout: LayoutGrid,
    pub session: SessionContext,
    provider: Box<dyn StreamProvider>,
    stream_tx: mpsc::Sender<StreamEvent>,
    screen: ScreenAreas,
    /// Panel a mouse selection started in
    pub drag: Option<PanelId>,
}

impl AppState {
    pub fn new(
        config: &SessionConfig,
        session: SessionContext,
        provider: Box<dyn StreamProvider>,
        stream_tx: mpsc::Sender<StreamEvent>,
    ) -> Self {
        let mut layout = LayoutGrid::new(config.layout);
        for panel in &config.panels {
            layout.add_panel(panel.clone());
        }
        Self {
            layout,
            session,
            provider,
            stream_tx,
            screen: ScreenAreas::default(),
            drag: None,
        }
    }

    pub fn screen(&self) -> ScreenAreas {
        self.screen
    }

    pub fn add_panel(&mut self, config: InstanceConfig, now: Instant) -> PanelId {
        let on_demand = config.on_demand;
        let id = self.layout.add_panel(config);
        if !on_demand {
            self.start_panel(id, now);
        }
        id
    }

    /// Start every panel that is not deferred until focus, then the focused
    /// one regardless.
    pub fn start_panels(&mut self, now: Instant) {
        let eager: Vec<PanelId> = self
            .layout
            .panels()
            .filter(|p| !p.config.on_demand && p.instance.is_none())
            .map(Panel::id)
            .collect();
        for id in eager {
            self.start_panel(id, now);
        }
        self.ensure_focused_started(now);
    }

    pub fn ensure_focused_started(&mut self, now: Instant) {
        if let Some(id) = self.layout.focused() {
            if self.layout.panel(id).is_some_and(|p| p.instance.is_none()) {
                self.start_panel(id, now);
            }
        }
    }

    /// Cell size of a panel's terminal area at the current geometry.
    fn content_size(&self, panel: &Panel) -> (u16, u16) {
        if self.screen.panels.is_empty() {
            return FALLBACK_SIZE;
        }
        let rect = panel.content_area(panel.geometry().to_rect(self.screen.panels));
        (rect.width.max(1), rect.height.max(1))
    }

    fn spawn_instance(&self, id: PanelId, now: Instant) -> Option<TerminalInstance> {
        let panel = self.layout.panel(id)?;
        let (cols, rows) = self.content_size(panel);
        let mut instance = TerminalInstance::new(
            panel.config.clone(),
            cols,
            rows,
            &self.session.instance_settings,
        );
        if let Some(previous) = panel.instance.as_ref() {
            instance.inherit_run(previous.run());
        }
        let spawner = Spawner {
            provider: self.provider.as_ref(),
            tx: &self.stream_tx,
        };
        // A failed spawn is reported through the instance's event queue
        if let Err(e) = instance.start(&spawner, now) {
            debug!(%id, error = %e, "panel did not start");
        }
        Some(instance)
    }

    pub fn start_panel(&mut self, id: PanelId, now: Instant) -> bool {
        let Some(instance) = self.spawn_instance(id, now) else {
            return false;
        };
        info!(%id, instance = %instance.id(), "starting panel");
        self.layout.attach(id, instance)
    }

    /// Replace a panel's instance with a fresh one running the same command.
    pub fn restart_panel(&mut self, id: PanelId, now: Instant) -> bool {
        let restarts = self
            .layout
            .panel(id)
            .and_then(|p| p.instance.as_ref())
            .map_or(0, |i| i.run().restarts + 1);
        info!(%id, restarts, "restarting panel");
        self.start_panel(id, now)
    }

    pub fn close_panel(&mut self, id: PanelId) {
        if self.layout.remove_panel(id).is_some() && self.layout.is_empty() {
            info!("last panel closed");
            self.session.should_quit = true;
        }
    }

    /// Close every stream before the process exits.
    pub fn shutdown(&mut self) {
        for instance in self.layout.panels_mut().filter_map(|p| p.instance.as_mut()) {
            instance.dispose();
        }
    }

    pub fn focused_instance_mut(&mut self) -> Option<&mut TerminalInstance> {
        self.layout.focused_panel_mut()?.instance.as_mut()
    }

    pub fn focused_input_modes(&self) -> InputModes {
        self.layout
            .focused()
            .and_then(|id| self.layout.panel(id))
            .and_then(|p| p.instance.as_ref())
            .map(TerminalInstance::input_modes)
            .unwrap_or_default()
    }

    pub fn handle_stream_event(&mut self, event: StreamEvent, now: Instant) {
        let AppState {
            layout,
            provider,
            stream_tx,
            ..
        } = self;
        let Some(instance) = layout.instance_mut(event.instance_id()) else {
            debug!(instance = %event.instance_id(), "event for a disposed instance");
            return;
        };
        match event {
            StreamEvent::Data(_, bytes) => instance.on_stream_data(&bytes, now),
            StreamEvent::Exited(_, code) => {
                let spawner = Spawner {
                    provider: provider.as_ref(),
                    tx: stream_tx,
                };
                instance.on_stream_exit(code, &spawner, now);
            }
        }
    }

    /// Route what instances reported since the last call.
    pub fn drain_instance_events(&mut self, now: Instant) {
        let events: Vec<InstanceEvent> = self
            .layout
            .panels_mut()
            .filter_map(|p| p.instance.as_mut())
            .flat_map(TerminalInstance::drain_events)
            .collect();

        for event in events {
            self.layout.handle_event(&event);
            match event {
                InstanceEvent::SearchResult(instance, matched) => {
                    let focused = self.layout.focused().and_then(|id| self.layout.panel(id));
                    if focused.and_then(Panel::instance_id) == Some(instance) {
                        if let Some(prompt) = self.session.search_prompt_mut() {
                            prompt.matched = Some(matched);
                        }
                    }
                }
                // The panel stays, faded, showing the failure until closed
                InstanceEvent::SpawnFailed(_, message) => self.session.flash(message, now),
                InstanceEvent::Exited(instance, code) => {
                    if let Some(panel) = self
                        .layout
                        .panel_for_instance(instance)
                        .and_then(|id| self.layout.panel(id))
                    {
                        let message = format!("{} exited with status {}", panel.title(), code);
                        self.session.flash(message, now);
                    }
                    self.retire(instance);
                }
                InstanceEvent::StateChanged(..) | InstanceEvent::HasUnseenOutput(..) => {}
            }
        }
    }

    /// Panels whose instance ended go away unless configured to persist.
    fn retire(&mut self, instance: InstanceId) {
        let Some(id) = self.layout.panel_for_instance(instance) else {
            return;
        };
        if self.layout.panel(id).is_some_and(|p| !p.config.persist) {
            debug!(%id, "removing finished panel");
            self.close_panel(id);
        }
    }

    /// Fire every timer that is due.
    pub fn tick(&mut self, now: Instant) {
        for instance in self.layout.panels_mut().filter_map(|p| p.instance.as_mut()) {
            instance.on_tick(now);
        }
        self.session.on_tick(now);
        self.drain_instance_events(now);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.layout
            .panels()
            .filter_map(|p| p.instance.as_ref())
            .filter_map(FlowControlled::next_deadline)
            .chain(self.session.next_deadline())
            .min()
    }

    /// Track the screen size and resize every instance to its panel.
    pub fn set_screen(&mut self, screen: ScreenAreas, now: Instant) {
        if screen != self.screen {
            debug!(panels = ?screen.panels, "screen layout changed");
        }
        self.screen = screen;
        let sizes: Vec<(PanelId, (u16, u16))> = self
            .layout
            .panels()
            .filter(|p| {
                p.instance
                    .as_ref()
                    .is_some_and(|i| i.dimensions() != self.content_size(p))
            })
            .map(|p| (p.id(), self.content_size(p)))
            .collect();
        for (id, (cols, rows)) in sizes {
            if let Some(instance) = self.layout.panel_mut(id).and_then(|p| p.instance.as_mut()) {
                instance.resize_at(cols, rows, now);
            }
        }
    }

    /// Acknowledge flushes that just reached the screen.
    pub fn after_draw(&mut self) {
        for instance in self.layout.panels_mut().filter_map(|p| p.instance.as_mut()) {
            instance.complete_flushes();
        }
    }

    pub fn render_context(&self, id: PanelId) -> RenderContext {
        let popover_open = self.session.popover_open();
        RenderContext {
            focused: self.layout.focused() == Some(id) && !popover_open,
            faded: popover_open,
            popover_open,
            cursor_enabled: self.session.cursor_enabled(),
            blink_on: self.session.blink_on(),
            force: false,
        }
    }

    /// Terminal-relative cell under a screen position, clamped to the
    /// panel's content area.
    pub fn cell_at(&self, id: PanelId, x: u16, y: u16) -> Option<(u16, u16)> {
        let panel = self.layout.panel(id)?;
        let content = panel.content_area(panel.geometry().to_rect(self.screen.panels));
        if content.is_empty() {
            return None;
        }
        let col = x.clamp(content.x, content.right() - 1) - content.x;
        let row = y.clamp(content.y, content.bottom() - 1) - content.y;
        Some((row, col))
    }

    pub fn content_rect(&self, id: PanelId) -> Option<Rect> {
        let panel = self.layout.panel(id)?;
        Some(panel.content_area(panel.geometry().to_rect(self.screen.panels)))
    }

    /// Copy the focused panel's selection to the system clipboard.
    pub fn copy_selection(&mut self) -> Result<usize> {
        let text = self
            .focused_instance_mut()
            .and_then(TerminalInstance::selection_text)
            .context("nothing selected")?;
        let mut clipboard = arboard::Clipboard::new().context("Failed to access clipboard")?;
        clipboard
            .set_text(text.clone())
            .context("Failed to set clipboard text")?;
        Ok(text.chars().count())
    }

    pub fn report(&mut self, message: impl Into<String>, now: Instant) {
        let message = message.into();
        warn!(%message, "reported to user");
        self.session.flash(message, now);
    }
}
