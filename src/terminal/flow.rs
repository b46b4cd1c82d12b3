//! Output aggregation and backpressure.
//!
//! Incoming chunks are concatenated and released as one flush after a short
//! debounce. Pending bytes are tracked against a high/low watermark pair so
//! the producer can be paused while the renderer catches up.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

pub const DEFAULT_FLUSH_DEBOUNCE: Duration = Duration::from_millis(5);
pub const DEFAULT_HIGH_WATERMARK: usize = 256 * 1024;
pub const DEFAULT_LOW_WATERMARK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Watermarks {
    #[serde(rename = "high_watermark")]
    pub high: usize,
    #[serde(rename = "low_watermark")]
    pub low: usize,
}

impl Default for Watermarks {
    fn default() -> Self {
        Self {
            high: DEFAULT_HIGH_WATERMARK,
            low: DEFAULT_LOW_WATERMARK,
        }
    }
}

impl Watermarks {
    /// Keep `low < high`; a bad pair falls back to a quarter of `high`.
    pub fn normalized(self) -> Self {
        let high = self.high.max(1);
        let low = if self.low < high { self.low } else { high / 4 };
        Self { high, low }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowSignal {
    Pause,
    Resume,
}

/// Snapshot exposed to metrics panes and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowState {
    pub pending_bytes: usize,
    pub paused: bool,
    pub high_watermark: usize,
    pub low_watermark: usize,
    pub in_flight: usize,
}

/// A block of bytes ready to be fed to the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flush {
    pub bytes: Vec<u8>,
}

impl Flush {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub struct FlowAggregator {
    buffer: Vec<u8>,
    deadline: Option<Instant>,
    debounce: Duration,
    watermarks: Watermarks,
    pending_bytes: usize,
    paused: bool,
    in_flight: usize,
}

impl FlowAggregator {
    pub fn new(watermarks: Watermarks, debounce: Duration) -> Self {
        Self {
            buffer: Vec::new(),
            deadline: None,
            debounce,
            watermarks: watermarks.normalized(),
            pending_bytes: 0,
            paused: false,
            in_flight: 0,
        }
    }

    /// Accept a chunk from the stream. Returns `Pause` the first time the
    /// pending total crosses the high watermark.
    pub fn push(&mut self, chunk: &[u8], now: Instant) -> Option<FlowSignal> {
        if chunk.is_empty() {
            return None;
        }
        self.buffer.extend_from_slice(chunk);
        self.pending_bytes += chunk.len();
        self.deadline = Some(now + self.debounce);

        if !self.paused && self.pending_bytes > self.watermarks.high {
            self.paused = true;
            return Some(FlowSignal::Pause);
        }
        None
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Release buffered bytes once the debounce has elapsed. An incomplete
    /// UTF-8 sequence at the tail is held back for the next flush.
    pub fn poll_flush(&mut self, now: Instant) -> Option<Flush> {
        match self.deadline {
            Some(deadline) if now >= deadline => {}
            _ => return None,
        }
        self.deadline = None;

        let keep = incomplete_utf8_tail(&self.buffer);
        let split = self.buffer.len() - keep;
        if split == 0 {
            return None;
        }
        let tail = self.buffer.split_off(split);
        let bytes = std::mem::replace(&mut self.buffer, tail);
        self.in_flight += 1;
        Some(Flush { bytes })
    }

    /// Drain everything immediately, ignoring the debounce and any partial
    /// UTF-8 tail. Used when the stream ends.
    pub fn drain(&mut self) -> Option<Flush> {
        self.deadline = None;
        if self.buffer.is_empty() {
            return None;
        }
        self.in_flight += 1;
        Some(Flush {
            bytes: std::mem::take(&mut self.buffer),
        })
    }

    /// The renderer finished applying `len` bytes. Returns `Resume` once
    /// when a paused producer may continue.
    pub fn complete(&mut self, len: usize) -> Option<FlowSignal> {
        self.pending_bytes = self.pending_bytes.saturating_sub(len);
        self.in_flight = self.in_flight.saturating_sub(1);

        if self.paused && self.pending_bytes < self.watermarks.low {
            self.paused = false;
            return Some(FlowSignal::Resume);
        }
        None
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight > 0
    }

    /// Drop buffered bytes and the pending deadline.
    pub fn cancel(&mut self) {
        self.buffer.clear();
        self.deadline = None;
        self.pending_bytes = 0;
        self.in_flight = 0;
        self.paused = false;
    }

    pub fn state(&self) -> FlowState {
        FlowState {
            pending_bytes: self.pending_bytes,
            paused: self.paused,
            high_watermark: self.watermarks.high,
            low_watermark: self.watermarks.low,
            in_flight: self.in_flight,
        }
    }
}

/// Number of trailing bytes that start a UTF-8 sequence not yet complete.
fn incomplete_utf8_tail(bytes: &[u8]) -> usize {
    let start = bytes.len().saturating_sub(3);
    for i in (start..bytes.len()).rev() {
        let b = bytes[i];
        if b & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let needed = if b & 0b1110_0000 == 0b1100_0000 {
            2
        } else if b & 0b1111_0000 == 0b1110_0000 {
            3
        } else if b & 0b1111_1000 == 0b1111_0000 {
            4
        } else {
            return 0;
        };
        let have = bytes.len() - i;
        return if have < needed { have } else { 0 };
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator(high: usize, low: usize) -> FlowAggregator {
        FlowAggregator::new(Watermarks { high, low }, DEFAULT_FLUSH_DEBOUNCE)
    }

    #[test]
    fn chunks_inside_debounce_flush_together() {
        let mut flow = aggregator(1024, 256);
        let t0 = Instant::now();

        flow.push(b"hel", t0);
        flow.push(b"lo", t0 + Duration::from_millis(3));
        assert!(flow.poll_flush(t0 + Duration::from_millis(6)).is_none());

        let flush = flow.poll_flush(t0 + Duration::from_millis(8)).unwrap();
        assert_eq!(flush.bytes, b"hello");
        assert!(flow.has_in_flight());
    }

    #[test]
    fn partial_utf8_waits_for_next_flush() {
        let mut flow = aggregator(1024, 256);
        let t0 = Instant::now();
        let snowman = "\u{2603}".as_bytes();

        flow.push(b"ab", t0);
        flow.push(&snowman[..1], t0);
        let first = flow.poll_flush(t0 + DEFAULT_FLUSH_DEBOUNCE).unwrap();
        assert_eq!(first.bytes, b"ab");

        let t1 = t0 + Duration::from_millis(10);
        flow.push(&snowman[1..], t1);
        let second = flow.poll_flush(t1 + DEFAULT_FLUSH_DEBOUNCE).unwrap();
        assert_eq!(second.bytes, snowman);
    }

    #[test]
    fn flood_pauses_once_and_resumes_once() {
        let mut flow = aggregator(50 * 1024, 5 * 1024);
        let t0 = Instant::now();
        let chunk = vec![b'x'; 1024];

        let pauses = (0..200)
            .filter_map(|_| flow.push(&chunk, t0))
            .filter(|s| *s == FlowSignal::Pause)
            .count();
        assert_eq!(pauses, 1);
        assert!(flow.state().paused);
        assert_eq!(flow.state().pending_bytes, 200 * 1024);

        let flush = flow.poll_flush(t0 + DEFAULT_FLUSH_DEBOUNCE).unwrap();
        assert_eq!(flush.len(), 200 * 1024);
        assert_eq!(flow.complete(flush.len()), Some(FlowSignal::Resume));
        assert_eq!(flow.complete(0), None);
        assert!(!flow.state().paused);
    }

    #[test]
    fn no_resume_above_low_watermark() {
        let mut flow = aggregator(100, 10);
        let t0 = Instant::now();

        assert_eq!(flow.push(&[b'x'; 150], t0), Some(FlowSignal::Pause));
        assert_eq!(flow.complete(100), None);
        assert_eq!(flow.complete(45), Some(FlowSignal::Resume));
    }

    #[test]
    fn cancel_clears_pending_work() {
        let mut flow = aggregator(100, 10);
        let t0 = Instant::now();
        flow.push(b"abc", t0);
        flow.cancel();

        assert!(flow.deadline().is_none());
        assert!(flow.poll_flush(t0 + Duration::from_secs(1)).is_none());
        assert_eq!(flow.state().pending_bytes, 0);
    }

    #[test]
    fn watermarks_are_normalized() {
        let marks = Watermarks { high: 100, low: 200 }.normalized();
        assert_eq!(marks, Watermarks { high: 100, low: 25 });
    }
}
