//! Per-page cell map and directional focus movement.

use super::geometry::{GridShape, Placement};
use super::PanelId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusDirection {
    Up,
    Down,
    Left,
    Right,
}

impl FocusDirection {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }
}

/// (row, col) -> panel for one page. Spanning panels occupy every cell they
/// cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemMap {
    shape: GridShape,
    cells: Vec<Option<PanelId>>,
}

impl ItemMap {
    pub fn build(shape: GridShape, placed: &[(PanelId, Placement)]) -> Self {
        let mut cells = vec![None; shape.cells()];
        for (id, p) in placed {
            for row in p.row..(p.row + p.row_span).min(shape.rows) {
                for col in p.col..(p.col + p.col_span).min(shape.cols) {
                    cells[row * shape.cols + col] = Some(*id);
                }
            }
        }
        Self { shape, cells }
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn get(&self, row: usize, col: usize) -> Option<PanelId> {
        if row >= self.shape.rows || col >= self.shape.cols {
            return None;
        }
        self.cells[row * self.shape.cols + col]
    }

    /// Next panel from `from` in `direction`.
    ///
    /// Moving right off the last column continues on the next row's first
    /// column, left continues on the previous row's last column; down and up
    /// continue in the next/previous column. Cells belonging to the current
    /// panel are skipped. For vertical moves a panel spanning several
    /// columns probes the column on the same half of the page as `index`.
    pub fn neighbor(
        &self,
        from: &Placement,
        index: usize,
        direction: FocusDirection,
    ) -> Option<PanelId> {
        let GridShape { cols, rows } = self.shape;
        let total = cols * rows;
        if total == 0 {
            return None;
        }
        let current = self.get(from.row, from.col);

        let probe_col = if from.col_span > 1 && (index % cols) * 2 >= cols {
            from.col + from.col_span - 1
        } else {
            from.col
        };

        // Positions are linear indices in row-major (horizontal moves) or
        // column-major (vertical moves) order.
        let (start, forward, column_major) = match direction {
            FocusDirection::Right => (from.row * cols + from.col + from.col_span - 1, true, false),
            FocusDirection::Left => (from.row * cols + from.col, false, false),
            FocusDirection::Down => (probe_col * rows + from.row + from.row_span - 1, true, true),
            FocusDirection::Up => (probe_col * rows + from.row, false, true),
        };

        for step in 1..total {
            let pos = if forward {
                (start + step) % total
            } else {
                (start + total - step) % total
            };
            let (row, col) = if column_major {
                (pos % rows, pos / rows)
            } else {
                (pos / cols, pos % cols)
            };
            match self.get(row, col) {
                Some(id) if Some(id) != current => return Some(id),
                _ => continue,
            }
        }
        None
    }
}
