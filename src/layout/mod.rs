//! Paged grid of panels, each wrapping one terminal instance.

mod focus;
mod geometry;

use std::collections::{BTreeMap, HashMap};

use ratatui::layout::Rect;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use focus::{FocusDirection, ItemMap};
pub use geometry::{GridShape, PercentRect, Placement};

use crate::models::InstanceConfig;
use crate::pty::InstanceId;
use crate::terminal::{InstanceEvent, PanelSurface, TerminalInstance};

pub const DEFAULT_PER_PAGE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PanelId(pub usize);

impl std::fmt::Display for PanelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "panel-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSettings {
    pub per_page: usize,
    /// Columns per page; `ceil(sqrt(per_page))` when unset
    pub cols: Option<usize>,
    /// Gap between panels, in percent of the content area
    pub gutter: f64,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            per_page: DEFAULT_PER_PAGE,
            cols: None,
            gutter: 0.0,
        }
    }
}

pub struct Panel {
    id: PanelId,
    pub config: InstanceConfig,
    /// `None` until started; on-demand panels start when first focused
    pub instance: Option<TerminalInstance>,
    pub surface: PanelSurface,
    placement: Placement,
    geometry: PercentRect,
    visible: bool,
    maximized: bool,
    unseen: bool,
}

impl Panel {
    fn new(id: PanelId, config: InstanceConfig) -> Self {
        Self {
            id,
            config,
            instance: None,
            surface: PanelSurface::default(),
            placement: Placement::default(),
            geometry: PercentRect::default(),
            visible: false,
            maximized: false,
            unseen: false,
        }
    }

    pub fn id(&self) -> PanelId {
        self.id
    }

    pub fn title(&self) -> String {
        self.config.display_title()
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn geometry(&self) -> PercentRect {
        self.geometry
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_maximized(&self) -> bool {
        self.maximized
    }

    pub fn has_unseen_output(&self) -> bool {
        self.unseen
    }

    pub fn instance_id(&self) -> Option<InstanceId> {
        self.instance.as_ref().map(TerminalInstance::id)
    }

    /// Stream ended or never started; drawn faded. Persisted panels are exempt.
    pub fn is_closing(&self) -> bool {
        !self.config.persist
            && self
                .instance
                .as_ref()
                .is_some_and(|i| i.state().is_gone())
    }

    /// Area left for terminal cells inside the border and optional footer.
    pub fn content_area(&self, rect: Rect) -> Rect {
        let inner = Rect::new(
            rect.x.saturating_add(1),
            rect.y.saturating_add(1),
            rect.width.saturating_sub(2),
            rect.height.saturating_sub(2),
        );
        if self.config.metrics && inner.height > 1 {
            Rect {
                height: inner.height - 1,
                ..inner
            }
        } else {
            inner
        }
    }

    fn set_visible(&mut self, visible: bool) {
        if self.visible == visible {
            return;
        }
        self.visible = visible;
        if let Some(instance) = self.instance.as_mut() {
            if visible {
                instance.activate();
            } else {
                instance.suspend();
            }
        }
    }
}

struct Maximized {
    panel: PanelId,
    saved: PercentRect,
    revealed: Vec<PanelId>,
}

/// Flat arena of panels. Insertion order defines which page a panel is on.
pub struct LayoutGrid {
    settings: LayoutSettings,
    shape: GridShape,
    slots: Vec<Option<Panel>>,
    order: Vec<PanelId>,
    current_page: usize,
    focused_by_page: HashMap<usize, usize>,
    item_maps: Vec<ItemMap>,
    maximized: BTreeMap<usize, Maximized>,
}

impl LayoutGrid {
    pub fn new(settings: LayoutSettings) -> Self {
        let settings = LayoutSettings {
            per_page: settings.per_page.max(1),
            gutter: settings.gutter.clamp(0.0, 10.0),
            ..settings
        };
        Self {
            shape: GridShape::for_page(settings.per_page, settings.cols),
            settings,
            slots: Vec::new(),
            order: Vec::new(),
            current_page: 0,
            focused_by_page: HashMap::new(),
            item_maps: Vec::new(),
            maximized: BTreeMap::new(),
        }
    }

    pub fn settings(&self) -> LayoutSettings {
        self.settings
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn add_panel(&mut self, config: InstanceConfig) -> PanelId {
        let id = PanelId(self.slots.len());
        debug!(%id, title = %config.display_title(), "adding panel");
        self.slots.push(Some(Panel::new(id, config)));
        self.order.push(id);
        self.relayout();
        id
    }

    /// Remove a panel and dispose its instance.
    pub fn remove_panel(&mut self, id: PanelId) -> Option<Panel> {
        let mut panel = self.slots.get_mut(id.0)?.take()?;
        if let Some(instance) = panel.instance.as_mut() {
            instance.dispose();
        }
        info!(%id, "removed panel");
        self.order.retain(|p| *p != id);
        self.relayout();
        Some(panel)
    }

    /// Hand a started instance to a panel, disposing any previous one.
    /// Panels that are not on screen start out suspended.
    pub fn attach(&mut self, id: PanelId, instance: TerminalInstance) -> bool {
        let Some(panel) = self.panel_mut(id) else {
            return false;
        };
        if let Some(mut previous) = panel.instance.replace(instance) {
            previous.dispose();
        }
        panel.unseen = false;
        panel.surface = PanelSurface::default();
        let visible = panel.visible;
        if let Some(instance) = panel.instance.as_mut() {
            if !visible {
                instance.suspend();
            }
        }
        true
    }

    pub fn panel(&self, id: PanelId) -> Option<&Panel> {
        self.slots.get(id.0)?.as_ref()
    }

    pub fn panel_mut(&mut self, id: PanelId) -> Option<&mut Panel> {
        self.slots.get_mut(id.0)?.as_mut()
    }

    /// Panels in page order.
    pub fn panels(&self) -> impl Iterator<Item = &Panel> {
        self.order.iter().filter_map(|id| self.panel(*id))
    }

    pub fn panels_mut(&mut self) -> impl Iterator<Item = &mut Panel> {
        self.slots.iter_mut().flatten()
    }

    pub fn panel_for_instance(&self, instance: InstanceId) -> Option<PanelId> {
        self.panels()
            .find(|p| p.instance_id() == Some(instance))
            .map(Panel::id)
    }

    pub fn instance_mut(&mut self, instance: InstanceId) -> Option<&mut TerminalInstance> {
        self.panels_mut()
            .filter_map(|p| p.instance.as_mut())
            .find(|i| i.id() == instance)
    }

    // Pages

    pub fn page_count(&self) -> usize {
        self.order.len().div_ceil(self.settings.per_page).max(1)
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_panels(&self, page: usize) -> &[PanelId] {
        let start = (page * self.settings.per_page).min(self.order.len());
        let end = (start + self.settings.per_page).min(self.order.len());
        &self.order[start..end]
    }

    pub fn page_of(&self, id: PanelId) -> Option<usize> {
        self.order
            .iter()
            .position(|p| *p == id)
            .map(|i| i / self.settings.per_page)
    }

    pub fn page_has_unseen(&self, page: usize) -> bool {
        self.page_panels(page)
            .iter()
            .filter_map(|id| self.panel(*id))
            .any(Panel::has_unseen_output)
    }

    /// Show the destination page and hide every other one. The focus index
    /// last used on that page is restored.
    pub fn switch_page(&mut self, page: usize) -> bool {
        if page >= self.page_count() {
            return false;
        }
        if page != self.current_page {
            debug!(from = self.current_page, to = page, "switching page");
        }
        self.current_page = page;
        self.apply_visibility();
        true
    }

    pub fn next_page(&mut self) -> bool {
        let count = self.page_count();
        if count < 2 {
            return false;
        }
        self.switch_page((self.current_page + 1) % count)
    }

    pub fn prev_page(&mut self) -> bool {
        let count = self.page_count();
        if count < 2 {
            return false;
        }
        self.switch_page((self.current_page + count - 1) % count)
    }

    // Focus

    pub fn focused_index(&self) -> usize {
        let len = self.page_panels(self.current_page).len();
        let index = self
            .focused_by_page
            .get(&self.current_page)
            .copied()
            .unwrap_or(0);
        index.min(len.saturating_sub(1))
    }

    pub fn focused(&self) -> Option<PanelId> {
        self.page_panels(self.current_page)
            .get(self.focused_index())
            .copied()
    }

    pub fn focused_panel_mut(&mut self) -> Option<&mut Panel> {
        let id = self.focused()?;
        self.panel_mut(id)
    }

    /// Focus `id`, switching to its page if needed.
    pub fn focus_panel(&mut self, id: PanelId) -> bool {
        let Some(position) = self.order.iter().position(|p| *p == id) else {
            return false;
        };
        let page = position / self.settings.per_page;
        if page != self.current_page {
            self.switch_page(page);
        }
        self.focused_by_page
            .insert(page, position % self.settings.per_page);
        true
    }

    pub fn focus_direction(&mut self, direction: FocusDirection) -> bool {
        let page = self.current_page;
        if self.maximized.contains_key(&page) {
            return false;
        }
        let Some(current) = self.focused() else {
            return false;
        };
        let Some(placement) = self.panel(current).map(Panel::placement) else {
            return false;
        };
        let Some(map) = self.item_maps.get(page) else {
            return false;
        };
        match map.neighbor(&placement, self.focused_index(), direction) {
            Some(next) => self.focus_panel(next),
            None => false,
        }
    }

    // Maximize

    pub fn maximized_on(&self, page: usize) -> Option<PanelId> {
        self.maximized.get(&page).map(|m| m.panel)
    }

    /// Stretch `id` over the whole page and hide its siblings. Any other
    /// panel maximized on the same page is minimized first.
    pub fn maximize(&mut self, id: PanelId) -> bool {
        let Some(page) = self.page_of(id) else {
            return false;
        };
        match self.maximized_on(page) {
            Some(current) if current == id => return true,
            Some(current) => {
                self.minimize(current);
            }
            None => {}
        }

        let siblings: Vec<PanelId> = self
            .page_panels(page)
            .iter()
            .copied()
            .filter(|p| *p != id)
            .collect();
        let revealed: Vec<PanelId> = siblings
            .iter()
            .copied()
            .filter(|p| self.panel(*p).is_some_and(Panel::is_visible))
            .collect();
        for sibling in siblings {
            if let Some(panel) = self.panel_mut(sibling) {
                panel.set_visible(false);
            }
        }
        let Some(panel) = self.panel_mut(id) else {
            return false;
        };
        let saved = panel.geometry;
        panel.geometry = PercentRect::FULL;
        panel.maximized = true;
        self.maximized.insert(
            page,
            Maximized {
                panel: id,
                saved,
                revealed,
            },
        );
        debug!(%id, page, "maximized");
        self.focus_panel(id)
    }

    /// Restore the geometry recorded by `maximize` and show exactly the
    /// siblings that were visible before.
    pub fn minimize(&mut self, id: PanelId) -> bool {
        let Some(page) = self.page_of(id) else {
            return false;
        };
        if self.maximized_on(page) != Some(id) {
            return false;
        }
        let Some(state) = self.maximized.remove(&page) else {
            return false;
        };
        if let Some(panel) = self.panel_mut(id) {
            panel.geometry = state.saved;
            panel.maximized = false;
        }
        for sibling in state.revealed {
            if let Some(panel) = self.panel_mut(sibling) {
                panel.set_visible(true);
            }
        }
        debug!(%id, page, "minimized");
        true
    }

    pub fn toggle_maximize(&mut self, id: PanelId) -> bool {
        match self.page_of(id) {
            Some(page) if self.maximized_on(page) == Some(id) => self.minimize(id),
            Some(_) => self.maximize(id),
            None => false,
        }
    }

    // Geometry

    /// Concrete rectangles of visible panels within `area`.
    pub fn panel_rects(&self, area: Rect) -> Vec<(PanelId, Rect)> {
        self.page_panels(self.current_page)
            .iter()
            .filter_map(|id| self.panel(*id))
            .filter(|p| p.visible)
            .map(|p| (p.id, p.geometry.to_rect(area)))
            .collect()
    }

    /// Visible panel under a screen position.
    pub fn panel_at(&self, area: Rect, x: u16, y: u16) -> Option<PanelId> {
        let position = ratatui::layout::Position::new(x, y);
        self.panel_rects(area)
            .into_iter()
            .find(|(_, rect)| rect.contains(position))
            .map(|(id, _)| id)
    }

    pub fn handle_event(&mut self, event: &InstanceEvent) {
        if let InstanceEvent::HasUnseenOutput(instance, unseen) = event {
            if let Some(id) = self.panel_for_instance(*instance) {
                if let Some(panel) = self.panel_mut(id) {
                    panel.unseen = *unseen;
                }
            }
        }
    }

    /// Recompute placements, geometry and item maps. Panels shift between
    /// pages here, so any maximized panel is dropped back into the grid.
    fn relayout(&mut self) {
        if !self.maximized.is_empty() {
            debug!(count = self.maximized.len(), "clearing maximize state on relayout");
            self.maximized.clear();
        }

        let per_page = self.settings.per_page;
        let shape = self.shape;
        let gutter = self.settings.gutter;
        let pages: Vec<Vec<PanelId>> = self.order.chunks(per_page).map(<[PanelId]>::to_vec).collect();

        self.item_maps.clear();
        for (page, ids) in pages.iter().enumerate() {
            let placements = geometry::place(page, ids.len(), shape);
            let placed: Vec<(PanelId, Placement)> = ids.iter().copied().zip(placements).collect();
            for (id, placement) in &placed {
                if let Some(panel) = self.panel_mut(*id) {
                    panel.placement = *placement;
                    panel.geometry = geometry::percent_rect(placement, shape, gutter);
                    panel.maximized = false;
                }
            }
            self.item_maps.push(ItemMap::build(shape, &placed));
        }

        let last_page = self.page_count() - 1;
        self.current_page = self.current_page.min(last_page);
        self.focused_by_page.retain(|page, _| *page <= last_page);
        self.apply_visibility();
    }

    fn apply_visibility(&mut self) {
        let current = self.current_page;
        let per_page = self.settings.per_page;
        let maximized = self.maximized_on(current);
        let order = self.order.clone();
        for (position, id) in order.into_iter().enumerate() {
            let on_page = position / per_page == current;
            let Some(panel) = self.panel_mut(id) else {
                continue;
            };
            let visible = on_page && maximized.is_none_or(|m| m == id);
            panel.set_visible(visible);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pty::mock::MockProvider;
    use crate::terminal::{
        FlowControlled, InstanceSettings, Spawner, TerminalState, DEFAULT_FLUSH_DEBOUNCE,
    };
    use std::time::Instant;
    use tokio::sync::mpsc;

    fn grid_with(count: usize, per_page: usize) -> (LayoutGrid, Vec<PanelId>) {
        let mut grid = LayoutGrid::new(LayoutSettings {
            per_page,
            ..LayoutSettings::default()
        });
        let ids = (0..count)
            .map(|i| grid.add_panel(InstanceConfig::script(format!("job {}", i))))
            .collect();
        (grid, ids)
    }

    fn visible(grid: &LayoutGrid) -> Vec<PanelId> {
        grid.panels().filter(|p| p.is_visible()).map(Panel::id).collect()
    }

    #[test]
    fn fifth_panel_lands_on_second_page() {
        let (mut grid, ids) = grid_with(5, 4);
        assert_eq!(grid.page_count(), 2);
        assert_eq!(grid.page_of(ids[4]), Some(1));
        assert_eq!(visible(&grid), ids[..4].to_vec());

        assert!(grid.switch_page(1));
        assert_eq!(grid.focused(), Some(ids[4]));
        assert_eq!(visible(&grid), vec![ids[4]]);
        assert_eq!(grid.panel(ids[4]).unwrap().geometry(), PercentRect::FULL);
    }

    #[test]
    fn page_focus_is_remembered() {
        let (mut grid, ids) = grid_with(6, 4);
        grid.focus_panel(ids[2]);
        grid.next_page();
        assert_eq!(grid.focused(), Some(ids[4]));
        grid.focus_direction(FocusDirection::Right);
        assert_eq!(grid.focused(), Some(ids[5]));

        grid.prev_page();
        assert_eq!(grid.focused(), Some(ids[2]));
        grid.next_page();
        assert_eq!(grid.focused(), Some(ids[5]));
    }

    #[test]
    fn focus_panel_switches_page() {
        let (mut grid, ids) = grid_with(5, 4);
        assert!(grid.focus_panel(ids[4]));
        assert_eq!(grid.current_page(), 1);
        assert!(!grid.switch_page(2));
    }

    #[test]
    fn maximize_then_minimize_restores_exactly() {
        let (mut grid, ids) = grid_with(4, 4);
        let before: Vec<PercentRect> = ids.iter().map(|id| grid.panel(*id).unwrap().geometry()).collect();

        assert!(grid.maximize(ids[1]));
        assert_eq!(visible(&grid), vec![ids[1]]);
        assert_eq!(grid.panel(ids[1]).unwrap().geometry(), PercentRect::FULL);
        assert!(grid.panel(ids[1]).unwrap().is_maximized());
        assert_eq!(grid.focused(), Some(ids[1]));

        assert!(grid.minimize(ids[1]));
        let after: Vec<PercentRect> = ids.iter().map(|id| grid.panel(*id).unwrap().geometry()).collect();
        for (a, b) in before.iter().zip(&after) {
            assert_eq!(a.left.to_bits(), b.left.to_bits());
            assert_eq!(a.top.to_bits(), b.top.to_bits());
            assert_eq!(a.width.to_bits(), b.width.to_bits());
            assert_eq!(a.height.to_bits(), b.height.to_bits());
        }
        assert_eq!(visible(&grid), ids);
    }

    #[test]
    fn only_one_maximized_per_page() {
        let (mut grid, ids) = grid_with(4, 4);
        let original = grid.panel(ids[0]).unwrap().geometry();
        grid.maximize(ids[0]);
        grid.maximize(ids[2]);

        assert_eq!(grid.maximized_on(0), Some(ids[2]));
        assert!(!grid.panel(ids[0]).unwrap().is_maximized());
        assert_eq!(grid.panel(ids[0]).unwrap().geometry(), original);
        assert_eq!(visible(&grid), vec![ids[2]]);

        grid.toggle_maximize(ids[2]);
        assert_eq!(grid.maximized_on(0), None);
        assert_eq!(visible(&grid).len(), 4);
    }

    #[test]
    fn directional_focus_is_blocked_while_maximized() {
        let (mut grid, ids) = grid_with(4, 4);
        grid.maximize(ids[0]);
        assert!(!grid.focus_direction(FocusDirection::Right));
        assert_eq!(grid.focused(), Some(ids[0]));
    }

    #[test]
    fn rects_tile_the_area() {
        let (grid, ids) = grid_with(3, 4);
        let area = Rect::new(0, 1, 80, 24);
        let rects = grid.panel_rects(area);
        assert_eq!(rects.len(), 3);
        let cells = |r: &Rect| r.width as u32 * r.height as u32;
        let total: u32 = rects.iter().map(|(_, r)| cells(r)).sum();
        assert_eq!(total, cells(&area));

        assert_eq!(grid.panel_at(area, 0, 1), Some(ids[0]));
        assert_eq!(grid.panel_at(area, 79, 1), Some(ids[1]));
        assert_eq!(grid.panel_at(area, 40, 24), Some(ids[2]));
        assert_eq!(grid.panel_at(area, 40, 0), None);
    }

    #[test]
    fn removing_a_panel_disposes_and_reflows() {
        let provider = MockProvider::default();
        let (tx, _rx) = mpsc::channel(8);
        let (mut grid, ids) = grid_with(5, 4);
        let mut instance = TerminalInstance::new(
            InstanceConfig::shell(),
            80,
            24,
            &InstanceSettings::default(),
        );
        instance
            .start(&Spawner { provider: &provider, tx: &tx }, Instant::now())
            .unwrap();
        grid.attach(ids[1], instance);

        let removed = grid.remove_panel(ids[1]).unwrap();
        assert_eq!(removed.instance.unwrap().state(), TerminalState::Destroyed);
        assert_eq!(provider.recorder(0).close_count(), 1);
        assert_eq!(grid.page_count(), 1);
        assert_eq!(grid.page_panels(0), &[ids[0], ids[2], ids[3], ids[4]]);
        assert!(grid.panel(ids[1]).is_none());
    }

    #[test]
    fn hidden_pages_suspend_their_instances() {
        let provider = MockProvider::default();
        let (tx, _rx) = mpsc::channel(8);
        let (mut grid, ids) = grid_with(5, 4);
        for id in [ids[0], ids[4]] {
            let mut instance = TerminalInstance::new(
                InstanceConfig::shell(),
                80,
                24,
                &InstanceSettings::default(),
            );
            instance
                .start(&Spawner { provider: &provider, tx: &tx }, Instant::now())
                .unwrap();
            grid.attach(id, instance);
        }
        let state = |grid: &LayoutGrid, id: PanelId| grid.panel(id).unwrap().instance.as_ref().unwrap().state();
        assert_eq!(state(&grid, ids[4]), TerminalState::Suspended);
        assert_eq!(state(&grid, ids[0]), TerminalState::Active);

        grid.switch_page(1);
        assert_eq!(state(&grid, ids[0]), TerminalState::Suspended);
        assert_eq!(state(&grid, ids[4]), TerminalState::Active);
    }

    #[test]
    fn backfilled_log_on_hidden_page_reports_new_output() {
        let provider = MockProvider::default();
        let (tx, _rx) = mpsc::channel(8);
        let now = Instant::now();
        let (mut grid, ids) = grid_with(5, 4);
        let mut config = InstanceConfig::log("tail -F app.log");
        config.backfill_command = Some("cat app.log".into());
        let mut instance = TerminalInstance::new(config, 80, 24, &InstanceSettings::default());
        let spawner = Spawner { provider: &provider, tx: &tx };
        instance.start(&spawner, now).unwrap();
        let instance_id = instance.id();
        grid.attach(ids[4], instance);

        let tail = grid.instance_mut(instance_id).unwrap();
        tail.on_stream_data(b"history\n", now);
        tail.on_stream_exit(0, &spawner, now);
        assert_eq!(tail.state(), TerminalState::Suspended);
        tail.on_stream_data(b"fresh\n", now);
        tail.on_tick(now + DEFAULT_FLUSH_DEBOUNCE);

        let events = tail.drain_events();
        for event in &events {
            grid.handle_event(event);
        }
        assert!(grid.page_has_unseen(1));
    }

    #[test]
    fn unseen_output_marks_the_page() {
        let (mut grid, ids) = grid_with(5, 4);
        let instance = TerminalInstance::new(
            InstanceConfig::shell(),
            80,
            24,
            &InstanceSettings::default(),
        );
        let instance_id = instance.id();
        grid.attach(ids[4], instance);

        grid.handle_event(&InstanceEvent::HasUnseenOutput(instance_id, true));
        assert!(grid.page_has_unseen(1));
        assert!(!grid.page_has_unseen(0));
        grid.handle_event(&InstanceEvent::HasUnseenOutput(instance_id, false));
        assert!(!grid.page_has_unseen(1));
    }
}
