//! Tracing setup. The TUI owns stdout, so everything goes to a file.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub fn default_log_path() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("gridterm")
        .join("gridterm.log")
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with `--debug`.
fn env_filter(debug: bool) -> EnvFilter {
    let default = if debug { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

pub fn build_subscriber(log_file: File, debug: bool) -> impl tracing::Subscriber + Send + Sync {
    let fmt_layer = fmt::layer()
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter(debug))
}

pub fn init(path: &Path, debug: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    tracing::subscriber::set_global_default(build_subscriber(file, debug))
        .context("installing tracing subscriber")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_events_to_the_file() {
        let log_file = tempfile::NamedTempFile::new().unwrap();
        let subscriber = build_subscriber(log_file.reopen().unwrap(), true);

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(panel = 3, "flush scheduled");
        });

        let contents = std::fs::read_to_string(log_file.path()).unwrap();
        assert!(contents.contains("flush scheduled"));
        assert!(contents.contains("panel=3"));
    }
}
