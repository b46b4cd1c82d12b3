//! State shared by every panel for the lifetime of one run.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::{BindingScope, KeybindingConfig, TerminalSettings, DEFAULT_BLINK_INTERVAL};
use crate::terminal::{InstanceSettings, SearchOptions, SearchQuery};

pub const SEARCH_HISTORY_LIMIT: usize = 50;

/// How long a status-bar message stays up
pub const FLASH_DURATION: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPrompt {
    pub input: String,
    pub options: SearchOptions,
    /// Result of the last search; `None` until one has run
    pub matched: Option<bool>,
    history_index: Option<usize>,
}

impl SearchPrompt {
    pub fn query(&self) -> SearchQuery {
        SearchQuery::new(self.input.clone()).with_options(self.options.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Popover {
    Search(SearchPrompt),
    Help,
}

pub struct SessionContext {
    pub keybindings: KeybindingConfig,
    pub instance_settings: InstanceSettings,
    pub popover: Option<Popover>,
    pub should_quit: bool,
    search_history: VecDeque<String>,
    cursor_visible: bool,
    cursor_blink: bool,
    blink_interval: Duration,
    blink_on: bool,
    next_blink: Option<Instant>,
    flash: Option<(String, Instant)>,
}

impl SessionContext {
    pub fn new(
        keybindings: KeybindingConfig,
        terminal: TerminalSettings,
        instance_settings: InstanceSettings,
        now: Instant,
    ) -> Self {
        let mut session = Self {
            keybindings,
            instance_settings,
            popover: None,
            should_quit: false,
            search_history: VecDeque::new(),
            cursor_visible: terminal.cursor_visible,
            cursor_blink: terminal.cursor_blink,
            blink_interval: DEFAULT_BLINK_INTERVAL,
            blink_on: true,
            next_blink: None,
            flash: None,
        };
        session.reset_blink(now);
        session
    }

    // Cursor

    pub fn cursor_enabled(&self) -> bool {
        self.cursor_visible
    }

    pub fn blink_on(&self) -> bool {
        self.blink_on
    }

    /// Show the cursor solid and restart the blink cycle, e.g. after a key
    /// press.
    pub fn reset_blink(&mut self, now: Instant) {
        self.blink_on = true;
        self.next_blink = (self.cursor_visible && self.cursor_blink).then(|| now + self.blink_interval);
    }

    /// Advance blink and status timers. Returns true if anything visible
    /// changed.
    pub fn on_tick(&mut self, now: Instant) -> bool {
        let mut changed = false;
        if let Some(at) = self.next_blink {
            if now >= at {
                self.blink_on = !self.blink_on;
                self.next_blink = Some(now + self.blink_interval);
                changed = true;
            }
        }
        if self.flash.as_ref().is_some_and(|(_, until)| now >= *until) {
            self.flash = None;
            changed = true;
        }
        changed
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        let flash = self.flash.as_ref().map(|(_, until)| *until);
        match (self.next_blink, flash) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // Status line

    pub fn flash(&mut self, message: impl Into<String>, now: Instant) {
        self.flash = Some((message.into(), now + FLASH_DURATION));
    }

    pub fn status_message(&self) -> Option<&str> {
        self.flash.as_ref().map(|(message, _)| message.as_str())
    }

    // Popovers

    pub fn binding_scope(&self) -> BindingScope {
        match self.popover {
            None => BindingScope::Global,
            Some(Popover::Search(_)) => BindingScope::Search,
            Some(Popover::Help) => BindingScope::Help,
        }
    }

    pub fn popover_open(&self) -> bool {
        self.popover.is_some()
    }

    pub fn open_search(&mut self) {
        if !matches!(self.popover, Some(Popover::Search(_))) {
            self.popover = Some(Popover::Search(SearchPrompt::default()));
        }
    }

    pub fn open_help(&mut self) {
        self.popover = Some(Popover::Help);
    }

    /// Close whatever is open. A non-empty search is kept in history.
    pub fn close_popover(&mut self) -> Option<Popover> {
        let closed = self.popover.take();
        if let Some(Popover::Search(prompt)) = &closed {
            self.remember_search(&prompt.input);
        }
        closed
    }

    pub fn search_prompt(&self) -> Option<&SearchPrompt> {
        match &self.popover {
            Some(Popover::Search(prompt)) => Some(prompt),
            _ => None,
        }
    }

    pub fn search_prompt_mut(&mut self) -> Option<&mut SearchPrompt> {
        match &mut self.popover {
            Some(Popover::Search(prompt)) => Some(prompt),
            _ => None,
        }
    }

    // Search history, most recent first

    pub fn search_history(&self) -> impl Iterator<Item = &str> {
        self.search_history.iter().map(String::as_str)
    }

    pub fn remember_search(&mut self, pattern: &str) {
        if pattern.is_empty() {
            return;
        }
        self.search_history.retain(|p| p != pattern);
        self.search_history.push_front(pattern.to_string());
        self.search_history.truncate(SEARCH_HISTORY_LIMIT);
    }

    /// Replace the prompt input with the next older history entry, wrapping
    /// back to the newest. Returns false when there is nothing to recall.
    pub fn recall_history(&mut self) -> bool {
        let len = self.search_history.len();
        let Some(Popover::Search(prompt)) = &mut self.popover else {
            return false;
        };
        if len == 0 {
            return false;
        }
        let index = prompt.history_index.map_or(0, |i| (i + 1) % len);
        let Some(entry) = self.search_history.get(index) else {
            return false;
        };
        prompt.input = entry.clone();
        prompt.history_index = Some(index);
        prompt.matched = None;
        true
    }
}
