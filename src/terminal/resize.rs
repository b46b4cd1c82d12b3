//! Scroll-position recovery across geometry changes.
//!
//! A raw offset is meaningless once the engine reflows, so before resizing
//! we remember the text at the top of the viewport and how far down the
//! buffer it was, then look for that text near the same relative position.

use super::grid::CellGrid;

/// Characters of the top line kept as its signature
pub const ANCHOR_PREFIX_CHARS: usize = 24;
/// Lines searched on each side of the estimated position
pub const ANCHOR_SEARCH_RADIUS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pin {
    Top,
    Bottom,
    Free,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScrollAnchor {
    pub signature: String,
    /// `viewport_offset / max(base_y, 1)`, in 0.0..=1.0
    pub percent: f64,
    pub pin: Pin,
}

fn signature(text: &str) -> String {
    text.trim().chars().take(ANCHOR_PREFIX_CHARS).collect()
}

pub fn capture(grid: &mut dyn CellGrid) -> ScrollAnchor {
    let offset = grid.viewport_offset();
    let base_y = grid.base_y();
    let percent = (offset as f64 / base_y.max(1) as f64).clamp(0.0, 1.0);
    let pin = if offset >= base_y {
        Pin::Bottom
    } else if offset == 0 {
        Pin::Top
    } else {
        Pin::Free
    };
    let signature = grid
        .line(offset)
        .map(|line| signature(&line.text))
        .unwrap_or_default();
    ScrollAnchor {
        signature,
        percent,
        pin,
    }
}

/// Scroll `grid` back to the anchored line. Returns the new offset.
pub fn restore(grid: &mut dyn CellGrid, anchor: &ScrollAnchor) -> usize {
    let base_y = grid.base_y();
    if base_y == 0 {
        grid.scroll_to(0);
        return 0;
    }

    if let Some(found) = locate(grid, anchor) {
        grid.scroll_to(found);
        return grid.viewport_offset();
    }

    let offset = match anchor.pin {
        Pin::Top => 0,
        Pin::Bottom => base_y,
        Pin::Free => (anchor.percent * base_y as f64).round() as usize,
    };
    grid.scroll_to(offset);
    grid.viewport_offset()
}

fn locate(grid: &mut dyn CellGrid, anchor: &ScrollAnchor) -> Option<usize> {
    if anchor.signature.is_empty() || anchor.pin == Pin::Bottom {
        return None;
    }
    let len = grid.buffer_len();
    if len == 0 {
        return None;
    }
    let center = ((anchor.percent * len as f64).round() as usize).min(len - 1);

    for distance in 0..=ANCHOR_SEARCH_RADIUS {
        let above = center.checked_sub(distance);
        let below = Some(center + distance).filter(|row| distance > 0 && *row < len);
        if above.is_none() && below.is_none() {
            break;
        }
        for row in [above, below].into_iter().flatten() {
            let matches = grid
                .line(row)
                .map(|line| signature(&line.text) == anchor.signature)
                .unwrap_or(false);
            if matches {
                return Some(row);
            }
        }
    }
    None
}

/// Resize the grid and keep the viewport on the same content.
pub fn resize_anchored(grid: &mut dyn CellGrid, rows: u16, cols: u16) -> usize {
    let anchor = capture(grid);
    grid.resize(rows, cols);
    restore(grid, &anchor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::grid::Vt100Grid;

    fn log_grid(rows: u16, cols: u16, lines: usize, marker_at: usize) -> Vt100Grid {
        let mut grid = Vt100Grid::new(rows, cols, 1000);
        for i in 0..lines {
            if i == marker_at {
                grid.feed(b"node app.js started on port 3000\r\n");
            } else {
                grid.feed(format!("request {} handled\r\n", i).as_bytes());
            }
        }
        grid
    }

    #[test]
    fn anchor_survives_growing_the_viewport() {
        let mut grid = log_grid(24, 80, 200, 100);
        grid.scroll_to(100);
        assert!(grid.line(grid.viewport_offset()).unwrap().text.starts_with("node app.js"));

        resize_anchored(&mut grid, 40, 120);

        let top = grid.viewport_offset();
        let near = (top.saturating_sub(1)..=top + 1)
            .filter_map(|row| grid.line(row))
            .any(|line| line.text.starts_with("node app.js started"));
        assert!(near, "anchor not near viewport top {}", top);
    }

    #[test]
    fn anchor_survives_shrinking() {
        let mut grid = log_grid(24, 80, 200, 60);
        grid.scroll_to(60);

        resize_anchored(&mut grid, 10, 40);

        let top = grid.viewport_offset();
        assert!(grid.line(top).unwrap().text.starts_with("node app.js"));
    }

    #[test]
    fn live_edge_stays_pinned() {
        let mut grid = log_grid(24, 80, 200, 100);
        assert!(grid.at_live_edge());

        resize_anchored(&mut grid, 12, 80);
        assert!(grid.at_live_edge());
    }

    #[test]
    fn top_stays_pinned_without_anchor_text() {
        let mut grid = Vt100Grid::new(10, 40, 1000);
        grid.feed(b"\r\n\r\n");
        for i in 0..100 {
            grid.feed(format!("row {}\r\n", i).as_bytes());
        }
        grid.scroll_to(0);

        resize_anchored(&mut grid, 5, 40);
        assert_eq!(grid.viewport_offset(), 0);
    }

    #[test]
    fn short_buffer_needs_no_scrolling() {
        let mut grid = Vt100Grid::new(24, 80, 1000);
        grid.feed(b"one\r\ntwo\r\n");

        assert_eq!(resize_anchored(&mut grid, 30, 100), 0);
    }
}
