#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Requested,
    Exited(i32),
    SpawnFailed,
}

/// Lifecycle of a terminal instance.
///
/// `Created -> Starting -> Active <-> Suspended`, and any live state may
/// move to `Closing`, which ends in `Destroyed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Created,
    /// `backfill` is set while a log panel is reading its history
    Starting { backfill: bool },
    Active,
    Suspended,
    Closing(CloseReason),
    Destroyed,
}

impl TerminalState {
    pub fn can_transition(&self, to: &TerminalState) -> bool {
        use TerminalState::*;
        match (self, to) {
            (Created, Starting { .. }) => true,
            (Starting { backfill: true }, Starting { backfill: false }) => true,
            (Starting { .. }, Active) | (Starting { .. }, Suspended) => true,
            (Active, Suspended) | (Suspended, Active) => true,
            (Created | Starting { .. } | Active | Suspended, Closing(_)) => true,
            (Closing(_), Destroyed) => true,
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TerminalState::Created => "created",
            TerminalState::Starting { backfill: true } => "backfilling",
            TerminalState::Starting { backfill: false } => "starting",
            TerminalState::Active => "active",
            TerminalState::Suspended => "suspended",
            TerminalState::Closing(_) => "closing",
            TerminalState::Destroyed => "destroyed",
        }
    }

    pub fn is_starting(&self) -> bool {
        matches!(self, TerminalState::Starting { .. })
    }

    pub fn is_backfilling(&self) -> bool {
        matches!(self, TerminalState::Starting { backfill: true })
    }

    pub fn is_live(&self) -> bool {
        matches!(
            self,
            TerminalState::Starting { .. } | TerminalState::Active | TerminalState::Suspended
        )
    }

    pub fn is_closing(&self) -> bool {
        matches!(self, TerminalState::Closing(_))
    }

    pub fn is_gone(&self) -> bool {
        matches!(self, TerminalState::Closing(_) | TerminalState::Destroyed)
    }
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
