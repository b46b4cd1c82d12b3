use std::time::Instant;

use super::flow::FlowState;
use super::search::SearchQuery;
use crate::error::StreamError;

pub trait Writable {
    /// Append bytes to the stream in call order.
    fn write(&mut self, bytes: &[u8]) -> Result<(), StreamError>;

    fn accepts_input(&self) -> bool;
}

pub trait Resizable {
    fn resize(&mut self, cols: u16, rows: u16);

    /// (cols, rows)
    fn dimensions(&self) -> (u16, u16);
}

/// Each call reports whether a match was selected.
pub trait Searchable {
    fn find_next(&mut self, query: &SearchQuery) -> bool;
    fn find_previous(&mut self, query: &SearchQuery) -> bool;
    fn find_first(&mut self, query: &SearchQuery) -> bool;
    fn find_last(&mut self, query: &SearchQuery) -> bool;
    fn clear_search(&mut self);
}

pub trait FlowControlled {
    fn flow_state(&self) -> FlowState;

    /// Earliest moment `on_tick` has work to do
    fn next_deadline(&self) -> Option<Instant>;

    fn on_tick(&mut self, now: Instant);

    /// Acknowledge flushes that have been drawn
    fn complete_flushes(&mut self);
}
