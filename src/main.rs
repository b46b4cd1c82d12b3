mod app;
mod config;
mod error;
mod layout;
mod logging;
mod models;
mod pty;
mod terminal;
mod tui;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use app::run_tui;
use config::{load_keybindings, SessionConfig};
use models::InstanceConfig;

#[derive(Parser)]
#[command(name = "gridterm")]
#[command(version)]
#[command(about = "Paged grid of shells, log tails and script runs in one terminal")]
struct Cli {
    /// Session file; defaults to <config_dir>/gridterm/config.toml
    #[arg(short, long, env = "GRIDTERM_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long)]
    debug: bool,

    /// Where to write the log
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Run this command in an extra panel
    #[arg(last = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_path = cli.log_file.unwrap_or_else(logging::default_log_path);
    logging::init(&log_path, cli.debug)?;

    let mut config = SessionConfig::load(cli.config.as_deref()).context("loading session config")?;
    if !cli.command.is_empty() {
        config.panels.push(InstanceConfig::script(cli.command.join(" ")));
    }
    let keybindings = load_keybindings(config.keybindings.as_deref());

    info!(version = env!("CARGO_PKG_VERSION"), log = %log_path.display(), "gridterm starting");
    run_tui(config, keybindings).await
}
