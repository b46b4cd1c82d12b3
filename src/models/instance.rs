use super::kind::TerminalKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const DEFAULT_SCROLLBACK: usize = 1000;

/// Everything needed to (re)create one terminal instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InstanceConfig {
    pub title: Option<String>,
    pub kind: TerminalKind,
    /// Command line run through `sh -c`; shells default to `$SHELL`
    pub command: Option<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// Overrides the session-wide scrollback
    pub scrollback: Option<usize>,
    /// Log lines matching any of these are dropped
    pub ignore_patterns: Vec<String>,
    /// Run once before the live tail to fill history
    pub backfill_command: Option<String>,
    /// Keep the panel around, faded, after the stream exits
    pub persist: bool,
    /// Show the metrics footer
    pub metrics: bool,
    /// Start the stream only when the panel is first focused
    pub on_demand: bool,
}

impl InstanceConfig {
    pub fn shell() -> Self {
        Self::default()
    }

    pub fn script(command: impl Into<String>) -> Self {
        Self {
            kind: TerminalKind::ScriptRun,
            command: Some(command.into()),
            persist: true,
            ..Self::default()
        }
    }

    pub fn log(command: impl Into<String>) -> Self {
        Self {
            kind: TerminalKind::ProcessLog,
            command: Some(command.into()),
            ..Self::default()
        }
    }

    pub fn display_title(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        match &self.command {
            Some(command) => {
                let first = command.split_whitespace().next().unwrap_or(command);
                format!("{} {}", self.kind.display_name(), first)
            }
            None => self.kind.display_name().to_string(),
        }
    }

    pub fn scrollback_or(&self, default: usize) -> usize {
        self.scrollback.unwrap_or(default)
    }

    /// Program and arguments for the live stream
    pub fn program(&self) -> (String, Vec<String>) {
        match &self.command {
            Some(command) => shell_command(command),
            None => {
                let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string());
                (shell, Vec::new())
            }
        }
    }

    /// Program and arguments for the backfill step, if any
    pub fn backfill_program(&self) -> Option<(String, Vec<String>)> {
        self.backfill_command.as_deref().map(shell_command)
    }
}

fn shell_command(command: &str) -> (String, Vec<String>) {
    ("sh".to_string(), vec!["-c".to_string(), command.to_string()])
}
