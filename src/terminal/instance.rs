use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::backfill::{BackfillRing, LogFilter};
use super::capability::{FlowControlled, Resizable, Searchable, Writable};
use super::flow::{FlowAggregator, FlowSignal, FlowState, Flush, Watermarks, DEFAULT_FLUSH_DEBOUNCE};
use super::grid::{CellGrid, CursorState, Damage, InputModes, Vt100Grid};
use super::render::{build_patch, plan, CellPatch, RenderGate, RenderPlan, RenderView};
use super::resize;
use super::search::{Direction, SearchQuery, SearchService};
use super::selection::{BufferPoint, Selection};
use super::state::{CloseReason, TerminalState};
use crate::error::StreamError;
use crate::models::{InstanceConfig, RunRecord, TerminalKind, DEFAULT_SCROLLBACK};
use crate::pty::{ByteStream, InstanceId, SpawnRequest, StreamEvent, StreamProvider};

/// Time after attach or resize before the fast render path is trusted
pub const SETTLE_DELAY: Duration = Duration::from_millis(80);

const PROMPT_GLYPHS: [char; 5] = ['$', '#', '>', '%', '❯'];

const DSR_QUERY: &[u8] = b"\x1b[6n";
const DA_QUERIES: [&[u8]; 2] = [b"\x1b[c", b"\x1b[0c"];
const DA_RESPONSE: &[u8] = b"\x1b[?6c";

/// Session-wide defaults an instance is created with.
#[derive(Debug, Clone, Copy)]
pub struct InstanceSettings {
    pub scrollback: usize,
    pub watermarks: Watermarks,
    pub debounce: Duration,
}

impl Default for InstanceSettings {
    fn default() -> Self {
        Self {
            scrollback: DEFAULT_SCROLLBACK,
            watermarks: Watermarks::default(),
            debounce: DEFAULT_FLUSH_DEBOUNCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceEvent {
    StateChanged(InstanceId, TerminalState),
    HasUnseenOutput(InstanceId, bool),
    SearchResult(InstanceId, bool),
    /// Reported once; the instance stays in `Closing`
    SpawnFailed(InstanceId, String),
    Exited(InstanceId, i32),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClearOptions {
    /// Keep the first buffer line (typically the command that was run)
    pub first_line_only: bool,
    /// Drop the visible screen as well as history
    pub all: bool,
}

/// Per-pass inputs owned by the layout and session.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderContext {
    pub focused: bool,
    pub faded: bool,
    pub popover_open: bool,
    pub cursor_enabled: bool,
    pub blink_on: bool,
    pub force: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub bytes_received: u64,
    pub flushes: u64,
    pub lines_dropped: usize,
    pub backfilled_lines: usize,
}

/// Where spawned streams come from and where their events go.
pub struct Spawner<'a> {
    pub provider: &'a dyn StreamProvider,
    pub tx: &'a mpsc::Sender<StreamEvent>,
}

pub struct TerminalInstance {
    id: InstanceId,
    config: InstanceConfig,
    scrollback: usize,
    grid: Box<dyn CellGrid + Send>,
    stream: Option<Box<dyn ByteStream>>,
    state: TerminalState,
    flow: FlowAggregator,
    search: SearchService,
    highlight: Option<SearchQuery>,
    selection: Option<Selection>,
    filter: Option<LogFilter>,
    backfill: Option<BackfillRing>,
    events: Vec<InstanceEvent>,
    run: RunRecord,
    stats: StreamStats,
    flushed: Vec<usize>,
    has_rendered: bool,
    force_full: bool,
    settle_at: Option<Instant>,
    resize_deferred: bool,
    drawn_cursor: Option<CursorState>,
    unseen: bool,
    /// Hidden before the stream attached; enter `Suspended` instead of `Active`
    suspend_pending: bool,
    spawn_reported: bool,
}

impl TerminalInstance {
    pub fn new(config: InstanceConfig, cols: u16, rows: u16, settings: &InstanceSettings) -> Self {
        let scrollback = config.scrollback_or(settings.scrollback);
        let grid = Vt100Grid::new(rows, cols, scrollback);
        Self::with_grid(config, Box::new(grid), settings)
    }

    pub fn with_grid(
        config: InstanceConfig,
        grid: Box<dyn CellGrid + Send>,
        settings: &InstanceSettings,
    ) -> Self {
        Self {
            id: InstanceId::new_v4(),
            scrollback: config.scrollback_or(settings.scrollback),
            config,
            grid,
            stream: None,
            state: TerminalState::Created,
            flow: FlowAggregator::new(settings.watermarks, settings.debounce),
            search: SearchService::new(),
            highlight: None,
            selection: None,
            filter: None,
            backfill: None,
            events: Vec::new(),
            run: RunRecord::new(),
            stats: StreamStats::default(),
            flushed: Vec::new(),
            has_rendered: false,
            force_full: false,
            settle_at: None,
            resize_deferred: false,
            drawn_cursor: None,
            unseen: false,
            suspend_pending: false,
            spawn_reported: false,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn kind(&self) -> TerminalKind {
        self.config.kind
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    pub fn state(&self) -> TerminalState {
        self.state
    }

    pub fn run(&self) -> &RunRecord {
        &self.run
    }

    /// Carry the restart count over from the instance this one replaces.
    pub fn inherit_run(&mut self, previous: &RunRecord) {
        self.run = RunRecord::restarted(previous);
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    pub fn has_unseen_output(&self) -> bool {
        self.unseen
    }

    pub fn grid(&self) -> &dyn CellGrid {
        self.grid.as_ref()
    }

    pub fn input_modes(&self) -> InputModes {
        self.grid.input_modes()
    }

    pub fn drain_events(&mut self) -> Vec<InstanceEvent> {
        std::mem::take(&mut self.events)
    }

    fn transition(&mut self, to: TerminalState) -> bool {
        if !self.state.can_transition(&to) {
            debug!(id = %self.id, from = %self.state, to = %to, "ignored state transition");
            return false;
        }
        info!(id = %self.id, from = %self.state, to = %to, "terminal state");
        self.state = to;
        self.events.push(InstanceEvent::StateChanged(self.id, to));
        true
    }

    fn fail_spawn(&mut self, err: &StreamError) {
        warn!(id = %self.id, error = %err, "stream spawn failed");
        self.run.mark_failed();
        if !self.spawn_reported {
            self.spawn_reported = true;
            self.events.push(InstanceEvent::SpawnFailed(self.id, err.to_string()));
        }
        let message = format!("\r\n[failed to start: {}]\r\n", err);
        self.grid.feed(message.as_bytes());
        self.force_full = true;
        self.transition(TerminalState::Closing(CloseReason::SpawnFailed));
    }

    /// Attach the stream. Log panels with a backfill command read their
    /// history first and attach the live tail once that finishes.
    pub fn start(&mut self, spawner: &Spawner, now: Instant) -> Result<(), StreamError> {
        let (rows, cols) = self.grid.size();
        let backfill = if self.config.kind == TerminalKind::ProcessLog {
            SpawnRequest::backfill(&self.config, rows, cols)
        } else {
            None
        };

        if self.config.kind == TerminalKind::ProcessLog {
            match LogFilter::new(&self.config.ignore_patterns) {
                Ok(filter) => self.filter = Some(filter),
                Err(e) => {
                    warn!(id = %self.id, error = %e, "ignoring invalid ignore patterns");
                    self.filter = LogFilter::new(&[]).ok();
                }
            }
        }

        if !self.transition(TerminalState::Starting {
            backfill: backfill.is_some(),
        }) {
            return Err(StreamError::Closed);
        }
        self.settle_at = Some(now + SETTLE_DELAY);

        match backfill {
            Some(request) => {
                self.backfill = Some(BackfillRing::new(self.scrollback));
                self.attach(spawner, &request)
            }
            None => {
                let request = SpawnRequest::live(&self.config, rows, cols);
                self.attach(spawner, &request)?;
                self.become_active();
                Ok(())
            }
        }
    }

    fn attach(&mut self, spawner: &Spawner, request: &SpawnRequest) -> Result<(), StreamError> {
        match spawner.provider.spawn(self.id, request, spawner.tx.clone()) {
            Ok(stream) => {
                self.stream = Some(stream);
                Ok(())
            }
            Err(e) => {
                self.fail_spawn(&e);
                Err(e)
            }
        }
    }

    fn become_active(&mut self) {
        if self.suspend_pending {
            self.suspend_pending = false;
            self.transition(TerminalState::Suspended);
        } else {
            self.transition(TerminalState::Active);
        }
    }

    /// Raw bytes from the stream.
    pub fn on_stream_data(&mut self, bytes: &[u8], now: Instant) {
        if !self.state.is_live() {
            return;
        }
        self.stats.bytes_received += bytes.len() as u64;

        if let Some(ring) = self.backfill.as_mut() {
            ring.push_bytes(bytes);
            return;
        }

        let filtered;
        let bytes = match self.filter.as_mut() {
            Some(filter) => {
                filtered = filter.filter(bytes);
                self.stats.lines_dropped = filter.dropped();
                filtered.as_slice()
            }
            None => bytes,
        };

        if let Some(FlowSignal::Pause) = self.flow.push(bytes, now) {
            debug!(id = %self.id, pending = self.flow.state().pending_bytes, "pausing stream");
            if let Some(stream) = &self.stream {
                stream.pause();
            }
        }
    }

    /// The stream ended.
    pub fn on_stream_exit(&mut self, code: i32, spawner: &Spawner, now: Instant) {
        if self.state.is_backfilling() {
            self.finish_backfill(spawner, now);
            return;
        }
        if !self.state.is_live() {
            return;
        }

        if let Some(tail) = self.filter.as_mut().map(LogFilter::finish) {
            self.flow.push(&tail, now);
        }
        if let Some(flush) = self.flow.drain() {
            self.apply_flush(flush);
        }
        self.stream = None;
        self.run.mark_exited(code);
        info!(id = %self.id, code, "stream exited");
        self.events.push(InstanceEvent::Exited(self.id, code));
        self.force_full = true;
        self.transition(TerminalState::Closing(CloseReason::Exited(code)));
    }

    fn finish_backfill(&mut self, spawner: &Spawner, now: Instant) {
        let Some(ring) = self.backfill.take() else {
            return;
        };
        self.stats.backfilled_lines = ring.len();
        debug!(id = %self.id, lines = ring.len(), evicted = ring.evicted(), "backfill complete");

        let bytes = ring.into_bytes();
        let bytes = match self.filter.as_mut() {
            Some(filter) => filter.filter(&bytes),
            None => bytes,
        };
        self.grid.feed(&bytes);
        self.grid.scroll_to(self.grid.base_y());
        self.search.invalidate();
        self.force_full = true;
        self.settle_at = Some(now + SETTLE_DELAY);

        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close();
        }
        self.transition(TerminalState::Starting { backfill: false });
        let (rows, cols) = self.grid.size();
        let request = SpawnRequest::live(&self.config, rows, cols);
        if self.attach(spawner, &request).is_ok() {
            self.become_active();
        }
    }

    fn apply_flush(&mut self, flush: Flush) {
        let at_edge = self.grid.at_live_edge();
        let offset = self.grid.viewport_offset();
        self.grid.feed(&flush.bytes);
        // Output follows the live edge; a scrolled-back view stays put
        if at_edge {
            self.grid.scroll_to(self.grid.base_y());
        } else {
            self.grid.scroll_to(offset);
        }
        self.search.invalidate();
        self.stats.flushes += 1;
        self.flushed.push(flush.len());
        self.answer_queries(&flush.bytes);

        if self.state == TerminalState::Suspended && !self.unseen {
            self.unseen = true;
            self.events.push(InstanceEvent::HasUnseenOutput(self.id, true));
        }
    }

    /// Reply to cursor-position and device-attribute queries, which the
    /// emulation engine does not answer itself.
    fn answer_queries(&mut self, bytes: &[u8]) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        if !stream.is_writable() {
            return;
        }
        let contains = |needle: &[u8]| bytes.windows(needle.len()).any(|w| w == needle);
        let mut reply = Vec::new();
        if contains(DSR_QUERY) {
            let cursor = self.grid.cursor();
            reply.extend_from_slice(format!("\x1b[{};{}R", cursor.row + 1, cursor.col + 1).as_bytes());
        }
        if DA_QUERIES.iter().any(|q| contains(q)) {
            reply.extend_from_slice(DA_RESPONSE);
        }
        if !reply.is_empty() {
            if let Err(e) = stream.write(&reply) {
                debug!(id = %self.id, error = %e, "query reply failed");
            }
        }
    }

    /// Stop rendering while hidden; the stream keeps buffering.
    pub fn suspend(&mut self) {
        match self.state {
            TerminalState::Active => {
                self.transition(TerminalState::Suspended);
            }
            TerminalState::Created | TerminalState::Starting { .. } => self.suspend_pending = true,
            _ => {}
        }
    }

    pub fn activate(&mut self) {
        self.suspend_pending = false;
        if self.state == TerminalState::Suspended {
            self.transition(TerminalState::Active);
            self.force_full = true;
        }
        if self.unseen {
            self.unseen = false;
            self.events.push(InstanceEvent::HasUnseenOutput(self.id, false));
        }
    }

    pub fn clear(&mut self, opts: ClearOptions) {
        if opts.all {
            self.grid.reset(false);
        } else if opts.first_line_only {
            self.grid.reset(true);
        } else {
            self.grid.clear_history();
        }
        self.selection = None;
        self.search.invalidate();
        self.force_full = true;
    }

    /// Detach the stream and cancel all pending work. Repeated calls do
    /// nothing.
    pub fn dispose(&mut self) {
        if self.state == TerminalState::Destroyed {
            return;
        }
        if !self.state.is_closing() {
            self.transition(TerminalState::Closing(CloseReason::Requested));
        }
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close() {
                warn!(id = %self.id, error = %e, "failed to close stream");
            }
        }
        self.flow.cancel();
        self.flushed.clear();
        self.settle_at = None;
        self.resize_deferred = false;
        self.backfill = None;
        self.search.invalidate();
        self.transition(TerminalState::Destroyed);
    }

    pub fn resize_at(&mut self, cols: u16, rows: u16, now: Instant) {
        if self.grid.size() == (rows, cols) || self.state == TerminalState::Destroyed {
            return;
        }
        resize::resize_anchored(self.grid.as_mut(), rows, cols);
        if let Some(stream) = self.stream.as_mut() {
            if let Err(e) = stream.resize(rows, cols) {
                debug!(id = %self.id, error = %e, "stream resize failed");
            }
        }
        self.selection = None;
        self.search.invalidate();
        self.settle_at = Some(now + SETTLE_DELAY);
        self.force_full = true;
        if self.flow.has_in_flight() {
            self.resize_deferred = true;
        }
    }

    pub fn is_resize_deferred(&self) -> bool {
        self.resize_deferred
    }

    pub fn request_full_render(&mut self) {
        self.force_full = true;
    }

    // Scrolling

    pub fn scroll_lines(&mut self, delta: isize) {
        let offset = self.grid.viewport_offset();
        let target = if delta < 0 {
            offset.saturating_sub(delta.unsigned_abs())
        } else {
            offset.saturating_add(delta as usize)
        };
        self.grid.scroll_to(target.min(self.grid.base_y()));
    }

    pub fn scroll_page(&mut self, up: bool) {
        let page = self.grid.size().0.saturating_sub(1).max(1) as isize;
        self.scroll_lines(if up { -page } else { page });
    }

    pub fn scroll_to_top(&mut self) {
        self.grid.scroll_to(0);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.grid.scroll_to(self.grid.base_y());
    }

    // Mouse selection, in viewport coordinates

    fn to_buffer(&self, row: u16, col: u16) -> BufferPoint {
        BufferPoint::new(self.grid.viewport_offset() + row as usize, col as usize)
    }

    pub fn begin_selection(&mut self, row: u16, col: u16) {
        let point = self.to_buffer(row, col);
        self.selection = Some(Selection::new(point, point));
    }

    pub fn extend_selection(&mut self, row: u16, col: u16) {
        let point = self.to_buffer(row, col);
        if let Some(sel) = self.selection.as_mut() {
            sel.focus = point;
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    pub fn selection_text(&mut self) -> Option<String> {
        let sel = self.selection?;
        let text = sel.text(self.grid.as_mut());
        (!text.is_empty()).then_some(text)
    }

    /// Best-effort guess that a shell is idle at its prompt: the cursor sits
    /// just past the last non-blank line, which ends in a prompt glyph.
    pub fn at_prompt(&mut self) -> bool {
        if !self.config.kind.is_shell() || self.grid.alternate_screen() {
            return false;
        }
        let cursor = self.grid.cursor();
        let abs = self.grid.base_y() + cursor.row as usize;
        let Some(line) = self.grid.line(abs) else {
            return false;
        };
        let text = line.trimmed();
        let Some(last) = text.chars().next_back() else {
            return false;
        };
        let end_col = line.col_at_byte(text.len() - last.len_utf8()) + 1;
        let cursor_at_end = (cursor.col as usize).saturating_sub(end_col) <= 1
            && cursor.col as usize >= end_col;
        let below_blank = (abs + 1..self.grid.buffer_len())
            .all(|row| self.grid.line(row).is_some_and(|l| l.trimmed().is_empty()));
        cursor_at_end && below_blank && PROMPT_GLYPHS.contains(&last)
    }

    /// One render pass. Returns the patch to apply, or `None` when nothing
    /// needs drawing.
    pub fn render_pass(&mut self, ctx: &RenderContext, now: Instant) -> Option<CellPatch> {
        if self.state == TerminalState::Destroyed {
            return None;
        }
        let gate = RenderGate {
            has_prior: self.has_rendered,
            highlight_active: self.selection.is_some() || self.highlight.is_some(),
            popover_open: ctx.popover_open,
            settled: self.settle_at.is_none(),
            force: self.force_full || ctx.force,
            suspended: self.state == TerminalState::Suspended,
            deferred: self.resize_deferred,
        };
        if gate.suspended || gate.deferred {
            return None;
        }

        let (rows, _) = self.grid.size();
        let damage = self.grid.take_damage();
        let damage = match damage {
            Damage::Rows { last, .. } if last >= rows => {
                warn!(id = %self.id, last, rows, "dirty rows outside the grid, repainting");
                Damage::Full
            }
            other => other,
        };

        let cursor = self.visible_cursor(ctx);
        let mut decision = plan(gate, damage);
        if decision != RenderPlan::Full && cursor != self.drawn_cursor {
            let mut touched: Vec<u16> = [cursor, self.drawn_cursor]
                .into_iter()
                .flatten()
                .map(|c| c.row.min(rows.saturating_sub(1)))
                .collect();
            if let RenderPlan::Rows { first, last } = decision {
                touched.extend([first, last]);
            }
            if let (Some(&first), Some(&last)) = (touched.iter().min(), touched.iter().max()) {
                decision = RenderPlan::Rows { first, last };
            }
        }

        let (first, last) = match decision {
            RenderPlan::Skip | RenderPlan::Clean => return None,
            RenderPlan::Full => (0, rows.saturating_sub(1)),
            RenderPlan::Rows { first, last } => (first, last),
        };

        let offset = self.grid.viewport_offset();
        let matches = match &self.highlight {
            Some(query) => {
                self.search
                    .visible_matches(self.grid.as_mut(), query, offset, rows as usize, now)
            }
            None => Vec::new(),
        };
        let view = RenderView {
            offset,
            selection: self.selection,
            matches: &matches,
            cursor,
            faded: ctx.faded || self.state.is_closing(),
        };
        let patch = build_patch(self.grid.as_ref(), first, last, &view);

        self.has_rendered = true;
        self.force_full = false;
        self.drawn_cursor = cursor;
        Some(patch)
    }

    fn visible_cursor(&self, ctx: &RenderContext) -> Option<CursorState> {
        let cursor = self.grid.cursor();
        let show = ctx.focused
            && ctx.cursor_enabled
            && ctx.blink_on
            && !cursor.hidden
            && self.grid.at_live_edge()
            && self.state.is_live();
        show.then_some(cursor)
    }

    fn search_from(&mut self, query: &SearchQuery, from: BufferPoint, direction: Direction) -> bool {
        let now = Instant::now();
        let result = self.search.find(self.grid.as_mut(), query, from, direction, now);
        let matched = match result {
            Ok(Some(m)) => {
                self.selection = Some(m.as_selection());
                self.reveal(m.start.row);
                true
            }
            Ok(None) => false,
            Err(e) => {
                debug!(id = %self.id, error = %e, "invalid search pattern");
                false
            }
        };
        if !query.pattern.is_empty() {
            self.highlight = Some(query.clone());
        }
        self.force_full = true;
        self.events.push(InstanceEvent::SearchResult(self.id, matched));
        matched
    }

    /// Scroll so `row` is centered if it is outside the viewport.
    fn reveal(&mut self, row: usize) {
        let top = self.grid.viewport_offset();
        let rows = self.grid.size().0 as usize;
        if row < top || row >= top + rows {
            self.grid.scroll_to(row.saturating_sub(rows / 2));
        }
    }
}

impl Writable for TerminalInstance {
    fn write(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        if !self.config.kind.accepts_input() {
            return Err(StreamError::ReadOnly);
        }
        let stream = self.stream.as_mut().ok_or(StreamError::Closed)?;
        stream.write(bytes)?;
        if !self.grid.at_live_edge() {
            self.grid.scroll_to(self.grid.base_y());
        }
        Ok(())
    }

    fn accepts_input(&self) -> bool {
        self.config.kind.accepts_input()
            && self.state.is_live()
            && self.stream.as_ref().is_some_and(|s| s.is_writable())
    }
}

impl Resizable for TerminalInstance {
    fn resize(&mut self, cols: u16, rows: u16) {
        self.resize_at(cols, rows, Instant::now());
    }

    fn dimensions(&self) -> (u16, u16) {
        let (rows, cols) = self.grid.size();
        (cols, rows)
    }
}

impl Searchable for TerminalInstance {
    fn find_next(&mut self, query: &SearchQuery) -> bool {
        let from = match self.selection {
            Some(sel) => {
                let end = sel.end();
                BufferPoint::new(end.row, end.col + 1)
            }
            None => BufferPoint::new(self.grid.viewport_offset(), 0),
        };
        self.search_from(query, from, Direction::Forward)
    }

    fn find_previous(&mut self, query: &SearchQuery) -> bool {
        let from = match self.selection {
            Some(sel) => sel.start(),
            None => BufferPoint::new(self.grid.viewport_offset(), 0),
        };
        self.search_from(query, from, Direction::Backward)
    }

    fn find_first(&mut self, query: &SearchQuery) -> bool {
        self.search_from(query, BufferPoint::new(0, 0), Direction::Forward)
    }

    fn find_last(&mut self, query: &SearchQuery) -> bool {
        let last = self.grid.buffer_len().saturating_sub(1);
        self.search_from(query, BufferPoint::new(last, usize::MAX), Direction::Backward)
    }

    fn clear_search(&mut self) {
        self.highlight = None;
        self.search.clear_query();
        self.selection = None;
        self.force_full = true;
    }
}

impl FlowControlled for TerminalInstance {
    fn flow_state(&self) -> FlowState {
        self.flow.state()
    }

    fn next_deadline(&self) -> Option<Instant> {
        match (self.flow.deadline(), self.settle_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn on_tick(&mut self, now: Instant) {
        if self.settle_at.is_some_and(|at| now >= at) {
            self.settle_at = None;
            self.force_full = true;
        }
        if let Some(flush) = self.flow.poll_flush(now) {
            self.apply_flush(flush);
        }
    }

    fn complete_flushes(&mut self) {
        for len in std::mem::take(&mut self.flushed) {
            if let Some(FlowSignal::Resume) = self.flow.complete(len) {
                debug!(id = %self.id, "resuming stream");
                if let Some(stream) = &self.stream {
                    stream.resume();
                }
            }
        }
        if self.resize_deferred && !self.flow.has_in_flight() {
            self.resize_deferred = false;
            self.force_full = true;
        }
    }
}

impl Drop for TerminalInstance {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close();
        }
    }
}
