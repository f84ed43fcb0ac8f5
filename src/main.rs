//! stylewatch - stylesheet hot reload
//!
//! Watches one CSS file and re-applies it whenever it changes on disk.
//! Type a path on stdin to switch files, `r` to reload, `q` to quit.
//! A file literally named `r` or `q` is reached as `./r` or `./q`.

mod adapters;
mod app;
mod cancel;
mod config;
mod domain;
mod error;
mod ports;
mod scheduler;

use adapters::{ConsoleSink, NotifyPathWatcher, StdinCommands};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "stylewatch")]
#[command(about = "Hot-reload a stylesheet when it changes on disk")]
#[command(version)]
struct Args {
    /// Stylesheet to watch (default: STYLEWATCH_STYLESHEET or the config file)
    stylesheet: Option<PathBuf>,

    /// Pause between watch cycles, in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// How often a blocked watch checks for cancellation, in milliseconds
    #[arg(long)]
    poll_ms: Option<u64>,

    /// Config file (default: <config dir>/stylewatch/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stylewatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let cli = config::Layer {
        stylesheet: args.stylesheet,
        delay_ms: args.delay_ms,
        poll_ms: args.poll_ms,
    };
    let settings = config::load(cli, args.config.as_deref()).context("Failed to load settings")?;

    info!("Starting stylewatch v{}", env!("CARGO_PKG_VERSION"));

    let watcher = Arc::new(NotifyPathWatcher::new(settings.poll_interval));
    let mut app = app::App::new(watcher, ConsoleSink::stdout(), &settings)?;

    let config_path = match args.config {
        Some(path) => Some(path),
        None => config::default_config_path().ok(),
    };
    if let Some(path) = config_path {
        app = app.remember_in(path);
    }

    let commands = StdinCommands::spawn()?;
    app.run(&commands)?;

    let stats = app.stats();
    info!(
        reloads = stats.reloads,
        failed = stats.failed_reloads,
        warnings = stats.warnings,
        state = %app.state(),
        "stopped watching {}",
        app.current_target().display()
    );
    Ok(())
}
