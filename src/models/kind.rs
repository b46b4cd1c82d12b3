use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TerminalKind {
    #[default]
    #[serde(alias = "shell")]
    InteractiveShell,
    #[serde(alias = "log")]
    ProcessLog,
    #[serde(alias = "script")]
    ScriptRun,
}

impl TerminalKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            TerminalKind::InteractiveShell => "Shell",
            TerminalKind::ProcessLog => "Log",
            TerminalKind::ScriptRun => "Run",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            TerminalKind::InteractiveShell => "🖥",
            TerminalKind::ProcessLog => "📜",
            TerminalKind::ScriptRun => "⚡",
        }
    }

    pub fn badge(&self) -> &'static str {
        match self {
            TerminalKind::InteractiveShell => "S",
            TerminalKind::ProcessLog => "L",
            TerminalKind::ScriptRun => "R",
        }
    }

    /// Keyboard input is forwarded to the stream
    pub fn accepts_input(&self) -> bool {
        !matches!(self, TerminalKind::ProcessLog)
    }

    /// Runs on a pseudo-terminal rather than plain pipes
    pub fn uses_pty(&self) -> bool {
        !matches!(self, TerminalKind::ProcessLog)
    }

    pub fn is_shell(&self) -> bool {
        matches!(self, TerminalKind::InteractiveShell)
    }
}

impl std::fmt::Display for TerminalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
