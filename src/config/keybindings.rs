use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::ConfigError;

/// Default keybindings embedded at compile time
const DEFAULT_KEYBINDINGS: &str = include_str!("defaults.toml");

/// A key combination (key code + modifiers)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyCombo {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeyCombo {
    pub fn new(code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self { code, modifiers }
    }

    pub fn from_event(key: &KeyEvent) -> Self {
        Self::new(key.code, key.modifiers)
    }

    /// Parse a key string like "Ctrl-c", "Shift-PageUp", "Enter", "`"
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let mut modifiers = KeyModifiers::NONE;

        if s == "-" {
            return Some(Self::new(KeyCode::Char('-'), KeyModifiers::NONE));
        }

        let mut parts: Vec<&str> = s.split('-').collect();
        while parts.len() > 1 {
            let modifier = parts.remove(0).to_lowercase();
            match modifier.as_str() {
                "ctrl" | "c" => modifiers |= KeyModifiers::CONTROL,
                "alt" | "a" | "opt" | "option" => modifiers |= KeyModifiers::ALT,
                "shift" | "s" => modifiers |= KeyModifiers::SHIFT,
                "super" | "cmd" | "command" | "meta" => modifiers |= KeyModifiers::SUPER,
                _ => return None,
            }
        }

        let code = parse_key_code(parts[0])?;
        Some(Self::new(code, modifiers))
    }

    /// Convert to display string for UI
    pub fn display(&self) -> String {
        let mut parts = Vec::new();

        if self.modifiers.contains(KeyModifiers::SUPER) {
            parts.push("Cmd");
        }
        if self.modifiers.contains(KeyModifiers::CONTROL) {
            parts.push("Ctrl");
        }
        if self.modifiers.contains(KeyModifiers::ALT) {
            parts.push("Alt");
        }
        if self.modifiers.contains(KeyModifiers::SHIFT) {
            parts.push("Shift");
        }

        let key_name = key_code_display(&self.code);
        parts.push(&key_name);

        parts.join("-")
    }
}

fn parse_key_code(s: &str) -> Option<KeyCode> {
    if s.chars().count() == 1 {
        let c = s.chars().next()?;
        return Some(KeyCode::Char(c));
    }

    match s.to_lowercase().as_str() {
        "enter" | "return" => Some(KeyCode::Enter),
        "esc" | "escape" => Some(KeyCode::Esc),
        "tab" => Some(KeyCode::Tab),
        "backtab" => Some(KeyCode::BackTab),
        "backspace" | "bs" => Some(KeyCode::Backspace),
        "delete" | "del" => Some(KeyCode::Delete),
        "insert" | "ins" => Some(KeyCode::Insert),
        "up" => Some(KeyCode::Up),
        "down" => Some(KeyCode::Down),
        "left" => Some(KeyCode::Left),
        "right" => Some(KeyCode::Right),
        "home" => Some(KeyCode::Home),
        "end" => Some(KeyCode::End),
        "pageup" | "pgup" => Some(KeyCode::PageUp),
        "pagedown" | "pgdn" => Some(KeyCode::PageDown),
        "space" => Some(KeyCode::Char(' ')),
        "backtick" => Some(KeyCode::Char('`')),
        "tilde" => Some(KeyCode::Char('~')),
        f if f.starts_with('f') => f[1..].parse::<u8>().ok().filter(|n| (1..=12).contains(n)).map(KeyCode::F),
        _ => None,
    }
}

fn key_code_display(code: &KeyCode) -> String {
    match code {
        KeyCode::Char(' ') => "Space".to_string(),
        KeyCode::Char(c) => c.to_string(),
        KeyCode::Enter => "Enter".to_string(),
        KeyCode::Esc => "Esc".to_string(),
        KeyCode::Tab => "Tab".to_string(),
        KeyCode::BackTab => "BackTab".to_string(),
        KeyCode::Backspace => "Backspace".to_string(),
        KeyCode::Delete => "Delete".to_string(),
        KeyCode::Insert => "Insert".to_string(),
        KeyCode::Up => "Up".to_string(),
        KeyCode::Down => "Down".to_string(),
        KeyCode::Left => "Left".to_string(),
        KeyCode::Right => "Right".to_string(),
        KeyCode::Home => "Home".to_string(),
        KeyCode::End => "End".to_string(),
        KeyCode::PageUp => "PageUp".to_string(),
        KeyCode::PageDown => "PageDown".to_string(),
        KeyCode::F(n) => format!("F{}", n),
        _ => "?".to_string(),
    }
}

/// The action name as a string (matches `Action::from_name`)
pub type ActionName = String;

/// Raw TOML structure for keybindings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KeybindingsToml {
    #[serde(default)]
    pub global: HashMap<String, String>,

    #[serde(default)]
    pub popover: PopoverBindings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PopoverBindings {
    #[serde(default)]
    pub search: HashMap<String, String>,
    #[serde(default)]
    pub help: HashMap<String, String>,
}

/// Which set of bindings applies to a key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingScope {
    Global,
    Search,
    Help,
}

/// Parsed keybinding configuration with KeyCombo lookups
#[derive(Debug, Clone)]
pub struct KeybindingConfig {
    /// Active whenever no popover is open
    pub global: HashMap<KeyCombo, ActionName>,
    pub search: HashMap<KeyCombo, ActionName>,
    pub help: HashMap<KeyCombo, ActionName>,
}

impl Default for KeybindingConfig {
    fn default() -> Self {
        let raw: KeybindingsToml = toml::from_str(DEFAULT_KEYBINDINGS).unwrap_or_default();
        Self::from_raw(&raw)
    }
}

impl KeybindingConfig {
    /// Parse a HashMap<String, String> into HashMap<KeyCombo, ActionName>
    fn parse_bindings(raw: &HashMap<String, String>) -> HashMap<KeyCombo, ActionName> {
        raw.iter()
            .filter_map(|(key, action)| match KeyCombo::parse(key) {
                Some(combo) => Some((combo, action.clone())),
                None => {
                    warn!(key = %key, "ignoring unparseable key binding");
                    None
                }
            })
            .collect()
    }

    fn from_raw(raw: &KeybindingsToml) -> Self {
        Self {
            global: Self::parse_bindings(&raw.global),
            search: Self::parse_bindings(&raw.popover.search),
            help: Self::parse_bindings(&raw.popover.help),
        }
    }

    /// Layer user bindings over these; a user entry replaces the default
    /// for the same key.
    fn merge(&mut self, user: KeybindingConfig) {
        self.global.extend(user.global);
        self.search.extend(user.search);
        self.help.extend(user.help);
    }

    fn scope(&self, scope: BindingScope) -> &HashMap<KeyCombo, ActionName> {
        match scope {
            BindingScope::Global => &self.global,
            BindingScope::Search => &self.search,
            BindingScope::Help => &self.help,
        }
    }

    /// Action bound to `key`, ignoring a Shift that only changed the case
    /// of a character key.
    pub fn action_for(&self, scope: BindingScope, key: &KeyEvent) -> Option<&str> {
        let bindings = self.scope(scope);
        let combo = KeyCombo::from_event(key);
        if let Some(action) = bindings.get(&combo) {
            return Some(action);
        }
        if let KeyCode::Char(c) = combo.code {
            if combo.modifiers.contains(KeyModifiers::SHIFT) {
                let unshifted = KeyCombo::new(
                    KeyCode::Char(c.to_ascii_lowercase()),
                    combo.modifiers.difference(KeyModifiers::SHIFT),
                );
                return bindings.get(&unshifted).map(String::as_str);
            }
        }
        None
    }

    /// First key bound to `action`, for help and status hints
    pub fn key_for(&self, scope: BindingScope, action: &str) -> Option<String> {
        let mut keys: Vec<String> = self
            .scope(scope)
            .iter()
            .filter(|(_, name)| name.as_str() == action)
            .map(|(combo, _)| combo.display())
            .collect();
        keys.sort();
        keys.into_iter().next()
    }

    pub fn action_names(&self, scope: BindingScope) -> impl Iterator<Item = &str> {
        self.scope(scope).values().map(String::as_str)
    }
}

/// Read a keybindings file and parse it without the defaults.
pub fn load_from(path: &Path) -> Result<KeybindingConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: KeybindingsToml = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(KeybindingConfig::from_raw(&raw))
}

/// Defaults, overlaid with the user's file when one exists
pub fn load_keybindings(path: Option<&Path>) -> KeybindingConfig {
    let mut config = KeybindingConfig::default();
    let path = path.map(Path::to_path_buf).unwrap_or_else(get_user_config_path);
    if !path.exists() {
        return config;
    }
    match load_from(&path) {
        Ok(user) => {
            debug!(path = %path.display(), "loaded user keybindings");
            config.merge(user);
        }
        Err(e) => warn!(error = %e, "falling back to default keybindings"),
    }
    config
}

/// Get the path to user's keybindings config file
pub fn get_user_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gridterm")
        .join("keybindings.toml")
}
