mod instance;
mod kind;
mod run;

pub use instance::{InstanceConfig, DEFAULT_SCROLLBACK};
pub use kind::TerminalKind;
pub use run::{RunRecord, RunStatus};
