//! Boundary to the terminal emulation engine.
//!
//! Everything above this module talks to a [`CellGrid`]: bytes go in, a
//! viewport of styled cells, a cursor and absolute-line queries come out.
//! The production implementation wraps a `vt100::Parser`; escape-sequence
//! parsing stays inside that crate.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CellColor {
    #[default]
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

impl CellColor {
    pub fn is_default(&self) -> bool {
        matches!(self, CellColor::Default)
    }
}

impl From<vt100::Color> for CellColor {
    fn from(color: vt100::Color) -> Self {
        match color {
            vt100::Color::Default => CellColor::Default,
            vt100::Color::Idx(i) => CellColor::Indexed(i),
            vt100::Color::Rgb(r, g, b) => CellColor::Rgb(r, g, b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct GridCell {
    pub contents: String,
    pub fg: CellColor,
    pub bg: CellColor,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub inverse: bool,
    pub wide: bool,
    pub wide_continuation: bool,
}

impl GridCell {
    fn from_vt100(cell: &vt100::Cell) -> Self {
        Self {
            contents: cell.contents().to_string(),
            fg: cell.fgcolor().into(),
            bg: cell.bgcolor().into(),
            bold: cell.bold(),
            italic: cell.italic(),
            underline: cell.underline(),
            inverse: cell.inverse(),
            wide: cell.is_wide(),
            wide_continuation: cell.is_wide_continuation(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorState {
    /// Row relative to the live screen (not the scrolled viewport)
    pub row: u16,
    pub col: u16,
    pub hidden: bool,
}

/// Input encodings the running program has switched on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputModes {
    /// DECCKM: cursor keys are sent as `ESC O X`
    pub application_cursor: bool,
    pub bracketed_paste: bool,
}

/// One physical row of the buffer materialized as text.
///
/// `cell_starts[c]` is the byte offset in `text` where column `c` begins.
/// A wide-character continuation cell shares its start with the next cell.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GridLine {
    pub text: String,
    pub wrapped: bool,
    pub cell_starts: Vec<usize>,
}

impl GridLine {
    /// Column whose cell contains byte `offset` of `text`
    pub fn col_at_byte(&self, offset: usize) -> usize {
        self.cell_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1)
    }

    pub fn trimmed(&self) -> &str {
        self.text.trim_end()
    }
}

/// Rows changed since the previous render pass, in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Damage {
    None,
    Rows { first: u16, last: u16 },
    Full,
}

pub trait CellGrid {
    fn feed(&mut self, bytes: &[u8]);

    /// (rows, cols)
    fn size(&self) -> (u16, u16);

    fn resize(&mut self, rows: u16, cols: u16);

    /// Number of addressable lines: scrollback plus screen rows
    fn buffer_len(&self) -> usize;

    fn base_y(&self) -> usize {
        self.buffer_len().saturating_sub(self.size().0 as usize)
    }

    /// Absolute index of the first visible line
    fn viewport_offset(&self) -> usize;

    /// Scroll so `offset` becomes the first visible line (clamped to `base_y`)
    fn scroll_to(&mut self, offset: usize);

    fn at_live_edge(&self) -> bool {
        self.viewport_offset() >= self.base_y()
    }

    /// Cell at a viewport-relative position
    fn cell(&self, row: u16, col: u16) -> Option<GridCell>;

    /// Materialize an absolute line
    fn line(&mut self, abs: usize) -> Option<GridLine>;

    fn cursor(&self) -> CursorState;

    fn alternate_screen(&self) -> bool;

    fn input_modes(&self) -> InputModes;

    fn take_damage(&mut self) -> Damage;

    /// Forget dirty-row bookkeeping so the next pass reports `Damage::Full`
    fn invalidate_damage(&mut self);

    /// Drop scrollback history, keeping the visible screen
    fn clear_history(&mut self);

    /// Reset to an empty buffer, optionally keeping the first buffer line
    fn reset(&mut self, keep_first_line: bool);
}

pub struct Vt100Grid {
    parser: vt100::Parser,
    /// Upper bound on `buffer_len`
    scrollback_cap: usize,
    /// History length the parser was created with
    history_cap: usize,
    /// Lines currently held in the parser's scrollback
    history_len: usize,
    row_prints: Vec<u64>,
    printed_offset: Option<usize>,
}

impl Vt100Grid {
    pub fn new(rows: u16, cols: u16, scrollback_cap: usize) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        let scrollback_cap = scrollback_cap.max(rows as usize);
        let history_cap = scrollback_cap - rows as usize;
        Self {
            parser: vt100::Parser::new(rows, cols, history_cap),
            scrollback_cap,
            history_cap,
            history_len: 0,
            row_prints: Vec::new(),
            printed_offset: None,
        }
    }

    pub fn scrollback_cap(&self) -> usize {
        self.scrollback_cap
    }

    /// The parser only reports its scrollback length through the clamped
    /// scroll position, so probe it and restore the view.
    fn refresh_history(&mut self) {
        let position = self.parser.screen().scrollback();
        self.parser.screen_mut().set_scrollback(usize::MAX);
        self.history_len = self.parser.screen().scrollback();
        self.parser.screen_mut().set_scrollback(position);
    }

    /// Lines at the top of the parser's buffer that fall outside the cap
    fn hidden(&self) -> usize {
        let rows = self.parser.screen().size().0 as usize;
        (self.history_len + rows).saturating_sub(self.scrollback_cap)
    }

    fn read_row(&self, row: u16) -> GridLine {
        let screen = self.parser.screen();
        let (_, cols) = screen.size();
        let mut text = String::with_capacity(cols as usize);
        let mut cell_starts = Vec::with_capacity(cols as usize);
        for col in 0..cols {
            cell_starts.push(text.len());
            match screen.cell(row, col) {
                Some(cell) if cell.is_wide_continuation() => {}
                Some(cell) if cell.has_contents() => text.push_str(&cell.contents()),
                _ => text.push(' '),
            }
        }
        GridLine {
            text,
            wrapped: screen.row_wrapped(row),
            cell_starts,
        }
    }

    fn row_print(&self, row: u16) -> u64 {
        let screen = self.parser.screen();
        let (_, cols) = screen.size();
        let mut hasher = DefaultHasher::new();
        for col in 0..cols {
            if let Some(cell) = screen.cell(row, col) {
                GridCell::from_vt100(cell).hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    fn rebuild(&mut self, replay: &[u8]) {
        let (rows, cols) = self.parser.screen().size();
        self.parser = vt100::Parser::new(rows, cols, self.history_cap);
        if !replay.is_empty() {
            self.parser.process(replay);
        }
        self.refresh_history();
        self.invalidate_damage();
    }
}

impl CellGrid for Vt100Grid {
    fn feed(&mut self, bytes: &[u8]) {
        self.parser.process(bytes);
        self.refresh_history();
    }

    fn size(&self) -> (u16, u16) {
        self.parser.screen().size()
    }

    fn resize(&mut self, rows: u16, cols: u16) {
        let rows = rows.max(1);
        let cols = cols.max(1);
        self.scrollback_cap = self.scrollback_cap.max(rows as usize);
        self.parser.screen_mut().set_size(rows, cols);
        self.refresh_history();
        self.invalidate_damage();
    }

    fn buffer_len(&self) -> usize {
        let rows = self.parser.screen().size().0 as usize;
        (self.history_len + rows).min(self.scrollback_cap)
    }

    fn viewport_offset(&self) -> usize {
        let position = self.parser.screen().scrollback().min(self.history_len);
        (self.history_len - position).saturating_sub(self.hidden())
    }

    fn scroll_to(&mut self, offset: usize) {
        let offset = offset.min(self.base_y());
        let internal_top = (offset + self.hidden()).min(self.history_len);
        self.parser.screen_mut().set_scrollback(self.history_len - internal_top);
    }

    fn cell(&self, row: u16, col: u16) -> Option<GridCell> {
        self.parser.screen().cell(row, col).map(GridCell::from_vt100)
    }

    fn line(&mut self, abs: usize) -> Option<GridLine> {
        if abs >= self.buffer_len() {
            return None;
        }
        let internal = abs + self.hidden();
        let position = self.parser.screen().scrollback();
        let line = if internal < self.history_len {
            self.parser.screen_mut().set_scrollback(self.history_len - internal);
            let line = self.read_row(0);
            self.parser.screen_mut().set_scrollback(position);
            line
        } else {
            self.parser.screen_mut().set_scrollback(0);
            let line = self.read_row((internal - self.history_len) as u16);
            self.parser.screen_mut().set_scrollback(position);
            line
        };
        Some(line)
    }

    fn cursor(&self) -> CursorState {
        let screen = self.parser.screen();
        let (row, col) = screen.cursor_position();
        CursorState {
            row,
            col,
            hidden: screen.hide_cursor(),
        }
    }

    fn alternate_screen(&self) -> bool {
        self.parser.screen().alternate_screen()
    }

    fn input_modes(&self) -> InputModes {
        let screen = self.parser.screen();
        InputModes {
            application_cursor: screen.application_cursor(),
            bracketed_paste: screen.bracketed_paste(),
        }
    }

    fn take_damage(&mut self) -> Damage {
        let (rows, _) = self.size();
        let offset = self.viewport_offset();
        let prints: Vec<u64> = (0..rows).map(|row| self.row_print(row)).collect();

        if self.printed_offset != Some(offset) || self.row_prints.len() != prints.len() {
            self.row_prints = prints;
            self.printed_offset = Some(offset);
            return Damage::Full;
        }

        let mut dirty = prints
            .iter()
            .zip(self.row_prints.iter())
            .enumerate()
            .filter(|(_, (new, old))| new != old)
            .map(|(row, _)| row as u16);
        let damage = match dirty.next() {
            None => Damage::None,
            Some(first) => Damage::Rows {
                first,
                last: dirty.last().unwrap_or(first),
            },
        };
        self.row_prints = prints;
        damage
    }

    fn invalidate_damage(&mut self) {
        self.row_prints.clear();
        self.printed_offset = None;
    }

    fn clear_history(&mut self) {
        self.parser.screen_mut().set_scrollback(0);
        let screen = self.parser.screen().contents_formatted();
        self.rebuild(&screen);
    }

    fn reset(&mut self, keep_first_line: bool) {
        let mut replay = Vec::new();
        if keep_first_line {
            if let Some(first) = self.line(0) {
                replay.extend_from_slice(first.trimmed().as_bytes());
                replay.extend_from_slice(b"\r\n");
            }
        }
        self.rebuild(&replay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_lines(grid: &mut Vt100Grid, range: std::ops::Range<usize>) {
        for i in range {
            grid.feed(format!("line {}\r\n", i).as_bytes());
        }
    }

    #[test]
    fn buffer_len_counts_history_and_screen() {
        let mut grid = Vt100Grid::new(5, 20, 1000);
        feed_lines(&mut grid, 0..10);

        // 10 written lines plus the empty line holding the cursor
        assert_eq!(grid.buffer_len(), 11);
        assert_eq!(grid.base_y(), 6);
        assert_eq!(grid.viewport_offset(), 6);
        assert!(grid.at_live_edge());
    }

    #[test]
    fn tracks_program_input_modes() {
        let mut grid = Vt100Grid::new(5, 20, 100);
        assert_eq!(grid.input_modes(), InputModes::default());

        grid.feed(b"\x1b[?1h\x1b[?2004h");
        let modes = grid.input_modes();
        assert!(modes.application_cursor && modes.bracketed_paste);

        grid.feed(b"\x1b[?1l");
        assert!(!grid.input_modes().application_cursor);
    }

    #[test]
    fn buffer_never_exceeds_cap() {
        let mut grid = Vt100Grid::new(5, 20, 8);
        for i in 0..50 {
            grid.feed(format!("line {}\r\n", i).as_bytes());
            assert!(grid.buffer_len() <= 8);
        }
        assert_eq!(grid.buffer_len(), 8);
        assert_eq!(grid.line(0).unwrap().trimmed(), "line 43");
    }

    #[test]
    fn cap_holds_after_rows_grow() {
        let mut grid = Vt100Grid::new(5, 20, 10);
        feed_lines(&mut grid, 0..30);
        grid.resize(8, 20);
        assert!(grid.buffer_len() <= 10);
        assert!(grid.viewport_offset() <= grid.base_y());
    }

    #[test]
    fn reads_absolute_lines_without_moving_viewport() {
        let mut grid = Vt100Grid::new(5, 20, 1000);
        feed_lines(&mut grid, 0..10);
        grid.scroll_to(2);

        assert_eq!(grid.line(0).unwrap().trimmed(), "line 0");
        assert_eq!(grid.line(9).unwrap().trimmed(), "line 9");
        assert_eq!(grid.line(10).unwrap().trimmed(), "");
        assert!(grid.line(11).is_none());
        assert_eq!(grid.viewport_offset(), 2);
    }

    #[test]
    fn scroll_to_clamps_to_base_y() {
        let mut grid = Vt100Grid::new(5, 20, 1000);
        feed_lines(&mut grid, 0..10);

        grid.scroll_to(0);
        assert_eq!(grid.viewport_offset(), 0);
        assert_eq!(grid.cell(0, 0).unwrap().contents, "l");

        grid.scroll_to(500);
        assert_eq!(grid.viewport_offset(), grid.base_y());
    }

    #[test]
    fn soft_wrapped_rows_are_flagged() {
        let mut grid = Vt100Grid::new(5, 10, 100);
        grid.feed(b"0123456789abcdef\r\n");

        assert!(grid.line(0).unwrap().wrapped);
        assert!(!grid.line(1).unwrap().wrapped);
        assert_eq!(grid.line(1).unwrap().trimmed(), "abcdef");
    }

    #[test]
    fn damage_reports_only_changed_rows() {
        let mut grid = Vt100Grid::new(5, 20, 100);
        assert_eq!(grid.take_damage(), Damage::Full);

        grid.feed(b"\r\n\r\nhello");
        assert_eq!(grid.take_damage(), Damage::Rows { first: 2, last: 2 });
        assert_eq!(grid.take_damage(), Damage::None);
    }

    #[test]
    fn scrolling_forces_full_damage() {
        let mut grid = Vt100Grid::new(5, 20, 100);
        feed_lines(&mut grid, 0..10);
        let _ = grid.take_damage();

        grid.scroll_to(0);
        assert_eq!(grid.take_damage(), Damage::Full);
    }

    #[test]
    fn reset_can_keep_first_line() {
        let mut grid = Vt100Grid::new(5, 20, 100);
        grid.feed(b"$ make test\r\nrunning\r\nok\r\n");
        grid.reset(true);

        assert_eq!(grid.line(0).unwrap().trimmed(), "$ make test");
        assert_eq!(grid.line(1).unwrap().trimmed(), "");
        assert_eq!(grid.cursor().row, 1);
    }

    #[test]
    fn clear_history_keeps_screen() {
        let mut grid = Vt100Grid::new(3, 20, 100);
        feed_lines(&mut grid, 0..10);
        grid.clear_history();

        assert_eq!(grid.buffer_len(), 3);
        assert_eq!(grid.line(0).unwrap().trimmed(), "line 8");
    }

    #[test]
    fn col_at_byte_maps_back_to_cells() {
        let mut grid = Vt100Grid::new(3, 10, 100);
        grid.feed("a\u{6f22}b".as_bytes());
        let line = grid.line(0).unwrap();

        assert_eq!(line.col_at_byte(0), 0);
        assert_eq!(line.col_at_byte(1), 1);
        assert_eq!(line.col_at_byte(4), 3);
    }
}
