mod keybindings;
mod session;

pub use keybindings::{load_keybindings, BindingScope, KeyCombo, KeybindingConfig};
pub use session::{SessionConfig, TerminalSettings, DEFAULT_BLINK_INTERVAL};
