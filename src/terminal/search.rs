//! Incremental find over a live buffer.
//!
//! Soft-wrapped rows are joined into one logical line before matching so a
//! match may span physical rows. Materialized rows are cached for a short
//! time; the owning instance invalidates the cache whenever output arrives
//! or the geometry changes.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use regex::{Regex, RegexBuilder};

use super::grid::{CellGrid, GridLine};
use super::selection::{BufferPoint, Selection};

pub const LINE_CACHE_TTL: Duration = Duration::from_secs(15);

/// Characters that end a word for whole-word matching.
const NON_WORD_CHARS: &str = " ()[]{}'\",`;:|<>!@#$%^&*+=~?\\/.-";

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub regex: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SearchQuery {
    pub pattern: String,
    pub options: SearchOptions,
}

impl SearchQuery {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            options: SearchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }

    fn compile(&self) -> Result<Regex, regex::Error> {
        let source = if self.options.regex {
            self.pattern.clone()
        } else {
            regex::escape(&self.pattern)
        };
        RegexBuilder::new(&source)
            .case_insensitive(!self.options.case_sensitive)
            .build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Inclusive cell range of one match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchMatch {
    pub start: BufferPoint,
    pub end: BufferPoint,
}

impl SearchMatch {
    pub fn as_selection(&self) -> Selection {
        Selection::new(self.start, self.end)
    }
}

#[derive(Default)]
struct LineCache {
    lines: HashMap<usize, GridLine>,
    built_at: Option<Instant>,
}

impl LineCache {
    fn get(&mut self, grid: &mut dyn CellGrid, abs: usize, now: Instant) -> Option<GridLine> {
        match self.built_at {
            Some(at) if now.duration_since(at) < LINE_CACHE_TTL => {}
            _ => {
                self.lines.clear();
                self.built_at = Some(now);
            }
        }
        if let Some(line) = self.lines.get(&abs) {
            return Some(line.clone());
        }
        let line = grid.line(abs)?;
        self.lines.insert(abs, line.clone());
        Some(line)
    }

    fn clear(&mut self) {
        self.lines.clear();
        self.built_at = None;
    }
}

struct Segment {
    row: usize,
    offset: usize,
    line: GridLine,
}

/// Wrapped physical rows joined into one string.
struct LogicalLine {
    first_row: usize,
    last_row: usize,
    text: String,
    segments: Vec<Segment>,
}

impl LogicalLine {
    fn point_at(&self, byte: usize) -> BufferPoint {
        let index = self
            .segments
            .partition_point(|seg| seg.offset <= byte)
            .saturating_sub(1);
        let seg = &self.segments[index];
        BufferPoint::new(seg.row, seg.line.col_at_byte(byte - seg.offset))
    }

    fn matches(&self, regex: &Regex, whole_word: bool) -> Vec<SearchMatch> {
        let mut found = Vec::new();
        let mut pos = 0;
        while pos <= self.text.len() {
            let Some(m) = regex.find_at(&self.text, pos) else {
                break;
            };
            let step = self.text[m.start()..]
                .chars()
                .next()
                .map(char::len_utf8)
                .unwrap_or(1);
            let accepted =
                !m.is_empty() && (!whole_word || is_whole_word(&self.text, m.start(), m.end()));
            if accepted {
                let last_byte = self.text[..m.end()]
                    .char_indices()
                    .next_back()
                    .map(|(i, _)| i)
                    .unwrap_or(m.start());
                found.push(SearchMatch {
                    start: self.point_at(m.start()),
                    end: self.point_at(last_byte),
                });
                pos = m.end().max(m.start() + step);
            } else {
                pos = m.start() + step;
            }
        }
        found
    }
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !NON_WORD_CHARS.contains(c)
}

fn is_whole_word(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
}

/// Per-instance search state: the line cache and the compiled pattern.
#[derive(Default)]
pub struct SearchService {
    cache: LineCache,
    compiled: Option<(SearchQuery, Regex)>,
}

impl SearchService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    pub fn clear_query(&mut self) {
        self.compiled = None;
    }

    fn regex(&mut self, query: &SearchQuery) -> Result<Regex, regex::Error> {
        if let Some((cached, regex)) = &self.compiled {
            if cached == query {
                return Ok(regex.clone());
            }
        }
        let regex = query.compile()?;
        self.compiled = Some((query.clone(), regex.clone()));
        Ok(regex)
    }

    fn logical_line(&mut self, grid: &mut dyn CellGrid, row: usize, now: Instant) -> Option<LogicalLine> {
        let mut first = row;
        while first > 0 {
            match self.cache.get(grid, first - 1, now) {
                Some(prev) if prev.wrapped => first -= 1,
                _ => break,
            }
        }

        let mut text = String::new();
        let mut segments = Vec::new();
        let mut current = first;
        loop {
            let line = self.cache.get(grid, current, now)?;
            let wrapped = line.wrapped;
            let offset = text.len();
            if wrapped {
                text.push_str(&line.text);
            } else {
                text.push_str(line.trimmed());
            }
            segments.push(Segment {
                row: current,
                offset,
                line,
            });
            if !wrapped || current + 1 >= grid.buffer_len() {
                break;
            }
            current += 1;
        }

        Some(LogicalLine {
            first_row: first,
            last_row: current,
            text,
            segments,
        })
    }

    /// Find the next match after `from` (or before it, backwards), wrapping
    /// once around the buffer. Returns `Err` only for an invalid pattern.
    pub fn find(
        &mut self,
        grid: &mut dyn CellGrid,
        query: &SearchQuery,
        from: BufferPoint,
        direction: Direction,
        now: Instant,
    ) -> Result<Option<SearchMatch>, regex::Error> {
        let regex = self.regex(query)?;
        if query.pattern.is_empty() {
            return Ok(None);
        }
        let len = grid.buffer_len();
        if len == 0 {
            return Ok(None);
        }
        let from = BufferPoint::new(from.row.min(len - 1), from.col);
        let whole_word = query.options.whole_word;

        let found = match direction {
            Direction::Forward => self.scan_forward(grid, &regex, whole_word, from, len, now),
            Direction::Backward => self.scan_backward(grid, &regex, whole_word, from, len, now),
        };
        Ok(found)
    }

    fn scan_forward(
        &mut self,
        grid: &mut dyn CellGrid,
        regex: &Regex,
        whole_word: bool,
        from: BufferPoint,
        len: usize,
        now: Instant,
    ) -> Option<SearchMatch> {
        let Some(anchor) = self.logical_line(grid, from.row, now) else {
            return None;
        };
        let anchor_first = anchor.first_row;

        let mut line = Some(anchor);
        while let Some(current) = line {
            if let Some(m) = current
                .matches(regex, whole_word)
                .into_iter()
                .find(|m| m.start >= from)
            {
                return Some(m);
            }
            let next = current.last_row + 1;
            line = if next < len {
                self.logical_line(grid, next, now)
            } else {
                None
            };
        }

        // Wrap to the top and stop once the anchor line is covered again.
        let mut row = 0;
        while row <= anchor_first && row < len {
            let current = self.logical_line(grid, row, now)?;
            if let Some(m) = current
                .matches(regex, whole_word)
                .into_iter()
                .find(|m| m.start < from)
            {
                return Some(m);
            }
            row = current.last_row + 1;
        }
        None
    }

    fn scan_backward(
        &mut self,
        grid: &mut dyn CellGrid,
        regex: &Regex,
        whole_word: bool,
        from: BufferPoint,
        len: usize,
        now: Instant,
    ) -> Option<SearchMatch> {
        let Some(anchor) = self.logical_line(grid, from.row, now) else {
            return None;
        };
        let anchor_last = anchor.last_row;

        let mut line = Some(anchor);
        while let Some(current) = line {
            if let Some(m) = current
                .matches(regex, whole_word)
                .into_iter()
                .rev()
                .find(|m| m.start < from)
            {
                return Some(m);
            }
            line = if current.first_row > 0 {
                self.logical_line(grid, current.first_row - 1, now)
            } else {
                None
            };
        }

        // Wrap to the bottom and stop once the anchor line is covered again.
        let mut row = len - 1;
        loop {
            let current = self.logical_line(grid, row, now)?;
            if current.last_row < anchor_last {
                break;
            }
            if let Some(m) = current
                .matches(regex, whole_word)
                .into_iter()
                .rev()
                .find(|m| m.start >= from)
            {
                return Some(m);
            }
            if current.first_row == 0 {
                break;
            }
            row = current.first_row - 1;
        }
        None
    }

    /// All matches on logical lines touching the viewport rows
    /// `[top, top + rows)`.
    pub fn visible_matches(
        &mut self,
        grid: &mut dyn CellGrid,
        query: &SearchQuery,
        top: usize,
        rows: usize,
        now: Instant,
    ) -> Vec<SearchMatch> {
        if query.pattern.is_empty() {
            return Vec::new();
        }
        let Ok(regex) = self.regex(query) else {
            return Vec::new();
        };
        let bottom = (top + rows).min(grid.buffer_len());
        let mut found = Vec::new();
        let mut row = top;
        while row < bottom {
            let Some(line) = self.logical_line(grid, row, now) else {
                break;
            };
            found.extend(
                line.matches(&regex, query.options.whole_word)
                    .into_iter()
                    .filter(|m| m.end.row >= top && m.start.row < bottom),
            );
            row = line.last_row + 1;
        }
        found
    }
}
