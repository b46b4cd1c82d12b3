//! Session file: layout, flow limits, terminal defaults and the panel list.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::layout::LayoutSettings;
use crate::models::{InstanceConfig, DEFAULT_SCROLLBACK};
use crate::terminal::{InstanceSettings, LogFilter, Watermarks, DEFAULT_FLUSH_DEBOUNCE};

pub const DEFAULT_BLINK_INTERVAL: Duration = Duration::from_millis(530);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSettings {
    pub scrollback: usize,
    pub cursor_blink: bool,
    pub cursor_visible: bool,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            scrollback: DEFAULT_SCROLLBACK,
            cursor_blink: true,
            cursor_visible: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub layout: LayoutSettings,
    pub flow: Watermarks,
    pub terminal: TerminalSettings,
    /// Overrides `<config_dir>/gridterm/keybindings.toml`
    pub keybindings: Option<PathBuf>,
    #[serde(rename = "panel")]
    pub panels: Vec<InstanceConfig>,
}

impl SessionConfig {
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut config: SessionConfig =
            toml::from_str(content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        if config.panels.is_empty() {
            config.panels.push(InstanceConfig::shell());
        }
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content, path)?;
        info!(path = %path.display(), panels = config.panels.len(), "loaded session config");
        Ok(config)
    }

    /// An explicit path must exist; the default location is optional and a
    /// missing file yields a single shell panel.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        let path = default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            debug!(path = %path.display(), "no session config, starting one shell");
            Ok(Self::single_shell())
        }
    }

    pub fn single_shell() -> Self {
        Self {
            panels: vec![InstanceConfig::shell()],
            ..Self::default()
        }
    }

    fn validate(&mut self) -> Result<(), ConfigError> {
        if self.layout.per_page == 0 {
            return Err(ConfigError::Invalid("layout.per_page must be at least 1".into()));
        }
        if !(0.0..=10.0).contains(&self.layout.gutter) {
            return Err(ConfigError::Invalid(format!(
                "layout.gutter {} is outside 0..=10",
                self.layout.gutter
            )));
        }
        if self.terminal.scrollback == 0 {
            return Err(ConfigError::Invalid("terminal.scrollback must be at least 1".into()));
        }
        for panel in &self.panels {
            if panel.kind.uses_pty() || panel.command.is_some() {
                LogFilter::new(&panel.ignore_patterns)?;
            } else {
                return Err(ConfigError::Invalid(format!(
                    "panel `{}` needs a command",
                    panel.display_title()
                )));
            }
        }
        self.flow = self.flow.normalized();
        Ok(())
    }

    pub fn instance_settings(&self) -> InstanceSettings {
        InstanceSettings {
            scrollback: self.terminal.scrollback,
            watermarks: self.flow,
            debounce: DEFAULT_FLUSH_DEBOUNCE,
        }
    }
}

pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gridterm")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TerminalKind;
    use std::io::Write;

    const SAMPLE: &str = r#"
[layout]
per_page = 6
cols = 3
gutter = 1.0

[flow]
high_watermark = 51200
low_watermark = 5120

[terminal]
scrollback = 5000
cursor_blink = false

[[panel]]
title = "api"
kind = "log"
command = "tail -F /var/log/api.log"
backfill_command = "tail -n 5000 /var/log/api.log"
ignore_patterns = ["GET /healthz"]
metrics = true

[[panel]]
kind = "script"
command = "cargo test"
persist = true

[[panel]]
kind = "shell"
cwd = "/tmp"
env = { EDITOR = "vi" }
on_demand = true
"#;

    #[test]
    fn parses_a_full_session() {
        let config = SessionConfig::parse(SAMPLE, Path::new("sample.toml")).unwrap();
        assert_eq!(config.layout.per_page, 6);
        assert_eq!(config.layout.cols, Some(3));
        assert_eq!(config.flow, Watermarks { high: 51200, low: 5120 });
        assert_eq!(config.terminal.scrollback, 5000);
        assert!(!config.terminal.cursor_blink);
        assert!(config.terminal.cursor_visible);

        assert_eq!(config.panels.len(), 3);
        let log = &config.panels[0];
        assert_eq!(log.kind, TerminalKind::ProcessLog);
        assert_eq!(log.display_title(), "api");
        assert_eq!(log.ignore_patterns, vec!["GET /healthz".to_string()]);
        assert!(log.metrics);
        assert_eq!(config.panels[1].kind, TerminalKind::ScriptRun);
        assert!(config.panels[2].on_demand);
        assert_eq!(config.panels[2].env.get("EDITOR").map(String::as_str), Some("vi"));

        let settings = config.instance_settings();
        assert_eq!(settings.scrollback, 5000);
        assert_eq!(settings.watermarks.high, 51200);
    }

    #[test]
    fn empty_file_means_one_shell() {
        let config = SessionConfig::parse("", Path::new("empty.toml")).unwrap();
        assert_eq!(config.panels, vec![InstanceConfig::shell()]);
        assert_eq!(config.layout, LayoutSettings::default());
    }

    #[test]
    fn rejects_bad_patterns_and_commandless_logs() {
        let bad_regex = "[[panel]]\nkind = \"log\"\ncommand = \"tail x\"\nignore_patterns = [\"(\"]\n";
        assert!(matches!(
            SessionConfig::parse(bad_regex, Path::new("a.toml")),
            Err(ConfigError::InvalidPattern { .. })
        ));

        let no_command = "[[panel]]\nkind = \"log\"\n";
        assert!(matches!(
            SessionConfig::parse(no_command, Path::new("b.toml")),
            Err(ConfigError::Invalid(_))
        ));

        let zero_page = "[layout]\nper_page = 0\n";
        assert!(SessionConfig::parse(zero_page, Path::new("c.toml")).is_err());
    }

    #[test]
    fn inverted_watermarks_are_repaired() {
        let config = SessionConfig::parse(
            "[flow]\nhigh_watermark = 1000\nlow_watermark = 4000\n",
            Path::new("d.toml"),
        )
        .unwrap();
        assert_eq!(config.flow, Watermarks { high: 1000, low: 250 });
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = SessionConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.panels.len(), 3);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            SessionConfig::load(Some(&missing)),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn unknown_kind_is_a_parse_error() {
        let err = SessionConfig::parse("[[panel]]\nkind = \"docker\"\n", Path::new("e.toml"));
        assert!(matches!(err, Err(ConfigError::Parse { .. })));
    }
}
