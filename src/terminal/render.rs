//! Differential rendering of a cell grid into cell patches.
//!
//! A pass either repaints the whole viewport or only the rows the grid
//! reports dirty. Patches are applied in order to a [`PanelSurface`], which
//! the UI copies into the ratatui frame buffer.

use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};

use super::grid::{CellColor, CellGrid, CursorState, Damage, GridCell};
use super::search::SearchMatch;
use super::selection::Selection;

/// Foreground substituted for default-colored cells of a faded instance
pub const FADED_FG: Color = Color::DarkGray;
pub const MATCH_BG: Color = Color::Yellow;
pub const MATCH_FG: Color = Color::Black;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchCell {
    pub symbol: String,
    pub style: Style,
    /// Trailing half of a wide character
    pub skip: bool,
}

impl PatchCell {
    pub fn blank() -> Self {
        Self {
            symbol: " ".to_string(),
            style: Style::default(),
            skip: false,
        }
    }
}

/// A contiguous block of viewport rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellPatch {
    pub first_row: u16,
    pub cols: u16,
    pub rows: Vec<Vec<PatchCell>>,
}

impl CellPatch {
    pub fn row_range(&self) -> std::ops::Range<u16> {
        self.first_row..self.first_row + self.rows.len() as u16
    }
}

/// Inputs to the full-vs-fast-path decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderGate {
    pub has_prior: bool,
    pub highlight_active: bool,
    pub popover_open: bool,
    pub settled: bool,
    pub force: bool,
    pub suspended: bool,
    /// A resize is waiting for an in-flight flush
    pub deferred: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPlan {
    Skip,
    Clean,
    Full,
    Rows { first: u16, last: u16 },
}

pub fn plan(gate: RenderGate, damage: Damage) -> RenderPlan {
    if gate.suspended || gate.deferred {
        return RenderPlan::Skip;
    }
    if !gate.has_prior || gate.highlight_active || gate.popover_open || !gate.settled || gate.force {
        return RenderPlan::Full;
    }
    match damage {
        Damage::None => RenderPlan::Clean,
        Damage::Rows { first, last } => RenderPlan::Rows { first, last },
        Damage::Full => RenderPlan::Full,
    }
}

/// What the pass should overlay on the raw cells.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderView<'a> {
    pub offset: usize,
    pub selection: Option<Selection>,
    pub matches: &'a [SearchMatch],
    /// Set only when the cursor should be drawn this pass
    pub cursor: Option<CursorState>,
    pub faded: bool,
}

fn convert_color(color: CellColor) -> Color {
    match color {
        CellColor::Default => Color::Reset,
        CellColor::Indexed(i) => Color::Indexed(i),
        CellColor::Rgb(r, g, b) => Color::Rgb(r, g, b),
    }
}

pub fn cell_style(cell: &GridCell, faded: bool) -> Style {
    let mut style = Style::default();

    // Faded panels keep default text legible but de-emphasized. Cells with
    // palette background 0 are treated like default background.
    let plain_bg = matches!(cell.bg, CellColor::Default | CellColor::Indexed(0));
    if faded && cell.fg.is_default() && plain_bg {
        style = style.fg(FADED_FG);
    } else if !cell.fg.is_default() {
        style = style.fg(convert_color(cell.fg));
    }
    if !cell.bg.is_default() {
        style = style.bg(convert_color(cell.bg));
    }

    if cell.bold {
        style = style.add_modifier(Modifier::BOLD);
    }
    if cell.italic {
        style = style.add_modifier(Modifier::ITALIC);
    }
    if cell.underline {
        style = style.add_modifier(Modifier::UNDERLINED);
    }
    if cell.inverse {
        style = style.add_modifier(Modifier::REVERSED);
    }
    style
}

fn toggle_reverse(style: Style) -> Style {
    if style.add_modifier.contains(Modifier::REVERSED) {
        style.remove_modifier(Modifier::REVERSED)
    } else {
        style.add_modifier(Modifier::REVERSED)
    }
}

fn in_match(matches: &[SearchMatch], row: usize, col: usize) -> bool {
    matches
        .iter()
        .any(|m| m.as_selection().contains(row, col))
}

/// Build a patch for viewport rows `first..=last`.
pub fn build_patch(grid: &dyn CellGrid, first: u16, last: u16, view: &RenderView) -> CellPatch {
    let (rows, cols) = grid.size();
    let last = last.min(rows.saturating_sub(1));
    let mut out = Vec::with_capacity((last + 1).saturating_sub(first) as usize);

    for row in first..=last {
        let abs = view.offset + row as usize;
        let mut cells = Vec::with_capacity(cols as usize);
        for col in 0..cols {
            let Some(cell) = grid.cell(row, col) else {
                cells.push(PatchCell::blank());
                continue;
            };
            if cell.wide_continuation {
                cells.push(PatchCell {
                    symbol: String::new(),
                    style: Style::default(),
                    skip: true,
                });
                continue;
            }

            let mut style = cell_style(&cell, view.faded);
            let is_cursor = view
                .cursor
                .is_some_and(|c| c.row == row && c.col == col);

            if in_match(view.matches, abs, col as usize) {
                style = style.bg(MATCH_BG).fg(MATCH_FG);
            }
            if is_cursor {
                style = toggle_reverse(style);
            } else if view
                .selection
                .is_some_and(|sel| sel.contains(abs, col as usize))
            {
                style = style.add_modifier(Modifier::REVERSED);
            }

            let symbol = if cell.contents.is_empty() {
                " ".to_string()
            } else {
                cell.contents
            };
            cells.push(PatchCell {
                symbol,
                style,
                skip: false,
            });
        }
        out.push(cells);
    }

    CellPatch {
        first_row: first,
        cols,
        rows: out,
    }
}

/// Per-panel back buffer that patches are applied to.
#[derive(Debug, Clone, Default)]
pub struct PanelSurface {
    rows: u16,
    cols: u16,
    cells: Vec<PatchCell>,
}

impl PanelSurface {
    pub fn new(rows: u16, cols: u16) -> Self {
        let mut surface = Self::default();
        surface.resize(rows, cols);
        surface
    }

    pub fn size(&self) -> (u16, u16) {
        (self.rows, self.cols)
    }

    pub fn resize(&mut self, rows: u16, cols: u16) {
        if (rows, cols) == (self.rows, self.cols) {
            return;
        }
        self.rows = rows;
        self.cols = cols;
        self.cells = vec![PatchCell::blank(); rows as usize * cols as usize];
    }

    /// Returns false when the patch does not fit this surface.
    pub fn apply(&mut self, patch: &CellPatch) -> bool {
        if patch.cols != self.cols || patch.row_range().end > self.rows {
            return false;
        }
        for (i, row) in patch.rows.iter().enumerate() {
            let start = (patch.first_row as usize + i) * self.cols as usize;
            for (col, cell) in row.iter().enumerate().take(self.cols as usize) {
                self.cells[start + col] = cell.clone();
            }
        }
        true
    }

    pub fn cell(&self, row: u16, col: u16) -> Option<&PatchCell> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.cells.get(row as usize * self.cols as usize + col as usize)
    }

    /// Copy into the frame buffer, clipped to `area`.
    pub fn blit(&self, buf: &mut Buffer, area: Rect) {
        let rows = self.rows.min(area.height);
        let cols = self.cols.min(area.width);
        for row in 0..rows {
            for col in 0..cols {
                let Some(src) = self.cell(row, col) else {
                    continue;
                };
                if let Some(dst) = buf.cell_mut((area.x + col, area.y + row)) {
                    if src.skip {
                        dst.set_skip(true);
                        continue;
                    }
                    dst.set_skip(false);
                    dst.set_symbol(&src.symbol);
                    dst.set_style(src.style);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::grid::Vt100Grid;
    use crate::terminal::selection::BufferPoint;

    fn settled_gate() -> RenderGate {
        RenderGate {
            has_prior: true,
            settled: true,
            ..RenderGate::default()
        }
    }

    #[test]
    fn fast_path_only_when_nothing_forces_full() {
        let rows = Damage::Rows { first: 2, last: 3 };
        assert_eq!(plan(settled_gate(), rows), RenderPlan::Rows { first: 2, last: 3 });
        assert_eq!(plan(settled_gate(), Damage::None), RenderPlan::Clean);

        let forcing = [
            RenderGate { has_prior: false, ..settled_gate() },
            RenderGate { highlight_active: true, ..settled_gate() },
            RenderGate { popover_open: true, ..settled_gate() },
            RenderGate { settled: false, ..settled_gate() },
            RenderGate { force: true, ..settled_gate() },
        ];
        for gate in forcing {
            assert_eq!(plan(gate, rows), RenderPlan::Full);
        }
    }

    #[test]
    fn suspended_or_deferred_skips() {
        let suspended = RenderGate { suspended: true, force: true, ..settled_gate() };
        assert_eq!(plan(suspended, Damage::Full), RenderPlan::Skip);
        let deferred = RenderGate { deferred: true, ..settled_gate() };
        assert_eq!(plan(deferred, Damage::Full), RenderPlan::Skip);
    }

    #[test]
    fn selection_inverts_but_not_the_cursor_cell() {
        let mut grid = Vt100Grid::new(3, 10, 100);
        grid.feed(b"abcdef");
        let view = RenderView {
            selection: Some(Selection::new(BufferPoint::new(0, 1), BufferPoint::new(0, 6))),
            cursor: Some(grid.cursor()),
            ..RenderView::default()
        };

        let patch = build_patch(&grid, 0, 0, &view);
        let row = &patch.rows[0];
        assert!(!row[0].style.add_modifier.contains(Modifier::REVERSED));
        assert!(row[3].style.add_modifier.contains(Modifier::REVERSED));
        // The cursor sits at column 6, inside the selection.
        assert_eq!(grid.cursor().col, 6);
        assert!(row[6].style.add_modifier.contains(Modifier::REVERSED));
        assert!(!row[7].style.add_modifier.contains(Modifier::REVERSED));
    }

    #[test]
    fn faded_default_cells_are_dimmed() {
        let mut grid = Vt100Grid::new(3, 10, 100);
        grid.feed(b"a\x1b[31mb\x1b[0m\x1b[40mc");
        let view = RenderView {
            faded: true,
            ..RenderView::default()
        };

        let row = &build_patch(&grid, 0, 0, &view).rows[0];
        assert_eq!(row[0].style.fg, Some(FADED_FG));
        assert_eq!(row[1].style.fg, Some(Color::Indexed(1)));
        assert_eq!(row[2].style.fg, Some(FADED_FG));
        assert_eq!(row[2].style.bg, Some(Color::Indexed(0)));
    }

    #[test]
    fn search_matches_are_highlighted() {
        let mut grid = Vt100Grid::new(3, 10, 100);
        grid.feed(b"xx ok xx");
        let matches = [SearchMatch {
            start: BufferPoint::new(0, 3),
            end: BufferPoint::new(0, 4),
        }];
        let view = RenderView {
            matches: &matches,
            ..RenderView::default()
        };

        let row = &build_patch(&grid, 0, 0, &view).rows[0];
        assert_eq!(row[3].style.bg, Some(MATCH_BG));
        assert_eq!(row[2].style.bg, None);
    }

    #[test]
    fn patches_land_on_the_surface() {
        let mut grid = Vt100Grid::new(3, 5, 100);
        grid.feed(b"\r\nhi");
        let mut surface = PanelSurface::new(3, 5);

        let patch = build_patch(&grid, 1, 1, &RenderView::default());
        assert!(surface.apply(&patch));
        assert_eq!(surface.cell(1, 1).unwrap().symbol, "i");
        assert_eq!(surface.cell(0, 0).unwrap().symbol, " ");

        let mut buf = Buffer::empty(Rect::new(0, 0, 10, 10));
        surface.blit(&mut buf, Rect::new(2, 2, 5, 3));
        assert_eq!(buf[(2, 3)].symbol(), "h");
    }

    #[test]
    fn mismatched_patch_is_rejected() {
        let grid = Vt100Grid::new(3, 8, 100);
        let mut surface = PanelSurface::new(3, 5);
        let patch = build_patch(&grid, 0, 2, &RenderView::default());
        assert!(!surface.apply(&patch));
    }
}
