use super::grid::CellGrid;

/// A position in absolute buffer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BufferPoint {
    pub row: usize,
    pub col: usize,
}

impl BufferPoint {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Anchor is where the selection started, focus is where it currently ends.
/// Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub anchor: BufferPoint,
    pub focus: BufferPoint,
}

impl Selection {
    pub fn new(anchor: BufferPoint, focus: BufferPoint) -> Self {
        Self { anchor, focus }
    }

    pub fn start(&self) -> BufferPoint {
        self.anchor.min(self.focus)
    }

    pub fn end(&self) -> BufferPoint {
        self.anchor.max(self.focus)
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        let start = self.start();
        let end = self.end();
        if row < start.row || row > end.row {
            return false;
        }
        if start.row == end.row {
            return col >= start.col && col <= end.col;
        }
        if row == start.row {
            return col >= start.col;
        }
        if row == end.row {
            return col <= end.col;
        }
        true
    }

    /// Selected text with trailing blanks trimmed per row. Soft-wrapped rows
    /// are joined without a newline.
    pub fn text(&self, grid: &mut dyn CellGrid) -> String {
        let start = self.start();
        let end = self.end();
        let mut out = String::new();

        for row in start.row..=end.row {
            let Some(line) = grid.line(row) else {
                break;
            };
            let cols = line.cell_starts.len();
            if cols == 0 {
                continue;
            }
            let first = if row == start.row { start.col.min(cols) } else { 0 };
            let last = if row == end.row { end.col.min(cols - 1) } else { cols - 1 };
            if first <= last {
                let from = line.cell_starts[first];
                let to = line
                    .cell_starts
                    .get(last + 1)
                    .copied()
                    .unwrap_or(line.text.len());
                let piece = &line.text[from..to];
                if line.wrapped && row != end.row {
                    out.push_str(piece);
                } else {
                    out.push_str(piece.trim_end());
                }
            }
            if row != end.row && !line.wrapped {
                out.push('\n');
            }
        }
        out
    }
}
