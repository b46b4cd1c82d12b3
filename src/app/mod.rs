mod action;
mod handler;
mod input;
mod runtime;
mod session;
mod state;
#[cfg(test)]
pub(crate) mod test_support;

pub use action::Action;
pub use runtime::run_tui;
pub use session::{Popover, SearchPrompt, SessionContext};
pub use state::AppState;
