//! Page shape, span assignment and percentage geometry.

use ratatui::layout::Rect;

/// Position of a panel inside its page, in grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Placement {
    pub page: usize,
    pub row: usize,
    pub col: usize,
    pub row_span: usize,
    pub col_span: usize,
}

/// Geometry as percentages of the content area.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PercentRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl PercentRect {
    pub const FULL: PercentRect = PercentRect {
        left: 0.0,
        top: 0.0,
        width: 100.0,
        height: 100.0,
    };

    /// Round edges (not sizes) so neighbours share their boundary exactly.
    pub fn to_rect(&self, area: Rect) -> Rect {
        let edge = |origin: u16, extent: u16, percent: f64| -> u16 {
            let offset = (percent / 100.0 * extent as f64).round();
            origin + offset.clamp(0.0, extent as f64) as u16
        };
        let x0 = edge(area.x, area.width, self.left);
        let x1 = edge(area.x, area.width, self.left + self.width);
        let y0 = edge(area.y, area.height, self.top);
        let y1 = edge(area.y, area.height, self.top + self.height);
        Rect::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    pub cols: usize,
    pub rows: usize,
}

impl GridShape {
    /// `cols` defaults to `ceil(sqrt(per_page))`.
    pub fn for_page(per_page: usize, cols: Option<usize>) -> Self {
        let per_page = per_page.max(1);
        let cols = cols
            .filter(|c| *c > 0)
            .unwrap_or_else(|| (per_page as f64).sqrt().ceil() as usize)
            .min(per_page);
        let rows = per_page.div_ceil(cols);
        Self { cols, rows }
    }

    pub fn cells(&self) -> usize {
        self.cols * self.rows
    }
}

/// Width of one track when `count` tracks share 100% minus gutters.
pub fn track_size(count: usize, gutter: f64) -> f64 {
    let count = count.max(1) as f64;
    (100.0 - gutter * (count - 1.0)) / count
}

/// Row-major placement of `count` panels on one page. Panels in the last
/// populated row stretch down to the bottom and the final panel stretches to
/// the right edge, so no cell is left empty.
pub fn place(page: usize, count: usize, shape: GridShape) -> Vec<Placement> {
    if count == 0 {
        return Vec::new();
    }
    let count = count.min(shape.cells());
    let last_row = (count - 1) / shape.cols;
    (0..count)
        .map(|i| {
            let row = i / shape.cols;
            let col = i % shape.cols;
            let row_span = if row == last_row { shape.rows - last_row } else { 1 };
            let col_span = if i == count - 1 { shape.cols - col } else { 1 };
            Placement {
                page,
                row,
                col,
                row_span,
                col_span,
            }
        })
        .collect()
}

pub fn percent_rect(placement: &Placement, shape: GridShape, gutter: f64) -> PercentRect {
    let col_w = track_size(shape.cols, gutter);
    let row_h = track_size(shape.rows, gutter);
    let span = |track: f64, n: usize| track * n as f64 + gutter * (n as f64 - 1.0);
    PercentRect {
        left: placement.col as f64 * (col_w + gutter),
        top: placement.row as f64 * (row_h + gutter),
        width: span(col_w, placement.col_span),
        height: span(row_h, placement.row_span),
    }
}
