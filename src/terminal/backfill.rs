use std::collections::VecDeque;

use regex::RegexSet;

use crate::error::ConfigError;

/// Bounded line buffer filled by a log backfill step. Pushing past capacity
/// evicts the oldest line.
#[derive(Debug, Clone)]
pub struct BackfillRing {
    lines: VecDeque<Vec<u8>>,
    capacity: usize,
    partial: Vec<u8>,
    evicted: usize,
}

impl BackfillRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(4096)),
            capacity: capacity.max(1),
            partial: Vec::new(),
            evicted: 0,
        }
    }

    pub fn push_line(&mut self, line: Vec<u8>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
            self.evicted += 1;
        }
        self.lines.push_back(line);
    }

    /// Split a raw chunk into lines, carrying an unterminated tail.
    pub fn push_bytes(&mut self, chunk: &[u8]) {
        for &b in chunk {
            match b {
                b'\n' => {
                    let mut line = std::mem::take(&mut self.partial);
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    self.push_line(line);
                }
                _ => self.partial.push(b),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn evicted(&self) -> usize {
        self.evicted
    }

    /// Consume the ring into grid-ready bytes, one CRLF-terminated line each.
    pub fn into_bytes(mut self) -> Vec<u8> {
        if !self.partial.is_empty() {
            let tail = std::mem::take(&mut self.partial);
            self.push_line(tail);
        }
        let total: usize = self.lines.iter().map(|l| l.len() + 2).sum();
        let mut out = Vec::with_capacity(total);
        for line in self.lines {
            out.extend_from_slice(&line);
            out.extend_from_slice(b"\r\n");
        }
        out
    }
}

/// Line filter for log streams read from plain pipes: drops lines matching
/// an ignore pattern and turns bare `\n` into `\r\n`.
#[derive(Debug, Clone)]
pub struct LogFilter {
    ignore: Option<RegexSet>,
    partial: Vec<u8>,
    dropped: usize,
}

impl LogFilter {
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let ignore = if patterns.is_empty() {
            None
        } else {
            Some(RegexSet::new(patterns).map_err(|source| ConfigError::InvalidPattern {
                pattern: patterns.join(", "),
                source,
            })?)
        };
        Ok(Self {
            ignore,
            partial: Vec::new(),
            dropped: 0,
        })
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    fn keep(&self, line: &[u8]) -> bool {
        match &self.ignore {
            Some(set) => !set.is_match(&String::from_utf8_lossy(line)),
            None => true,
        }
    }

    /// Complete lines that pass the filter, CRLF-terminated.
    pub fn filter(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(chunk.len() + 16);
        for &b in chunk {
            if b != b'\n' {
                self.partial.push(b);
                continue;
            }
            let mut line = std::mem::take(&mut self.partial);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if self.keep(&line) {
                out.extend_from_slice(&line);
                out.extend_from_slice(b"\r\n");
            } else {
                self.dropped += 1;
            }
        }
        out
    }

    /// Release an unterminated final line once the stream has ended.
    pub fn finish(&mut self) -> Vec<u8> {
        let line = std::mem::take(&mut self.partial);
        if line.is_empty() || !self.keep(&line) {
            return Vec::new();
        }
        line
    }
}
