//! Command-line interface for launchkit.
//!
//! The CLI is a headless shell around the update engine: it starts the engine,
//! answers consent requests, and renders engine events as console output.
//!
//! # Commands
//!
//! - `check` - Report whether the client and launcher are current
//! - `update` - Check and install a client update
//! - `self-update` - Check and replace the launcher executable
//! - `status` - Show installed versions, last check, and leftover quarantines
//! - `watch` - Keep running and update on the configured schedule
//!
//! # Global Options
//!
//! - `--verbose` / `--quiet` - Log at debug level, or not at all
//! - `--config <PATH>` - Use a specific configuration file
//! - `--no-progress` - Disable progress bars
//!
//! # Exit Codes
//!
//! - `0` - The command completed
//! - `1` - The command failed; the error is printed with a suggestion where one applies
//! - `2` - `check --exit-code` found an update

mod check;
pub mod common;
mod self_update;
mod status;
mod update;
mod watch;

use crate::config::LauncherConfig;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Settings shared by every command, built from the global flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log filter. `None` disables logging.
    pub log_level: Option<String>,
    pub no_progress: bool,
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the stderr log subscriber.
    ///
    /// `RUST_LOG` wins over the default level but not over `--verbose` or `--quiet`.
    pub fn init_logging(&self, explicit: bool) {
        let filter = match self.log_level.as_deref() {
            None => EnvFilter::new("off"),
            Some(level) if explicit => EnvFilter::new(level),
            Some(level) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }

    /// Load the launcher configuration from `--config`, the environment, or the default path.
    pub async fn load_launcher_config(&self) -> Result<LauncherConfig> {
        LauncherConfig::load_with_optional(self.config_path.clone()).await
    }
}

#[derive(Parser)]
#[command(
    name = "launchkit",
    about = "Self-updating game client launcher",
    version,
    long_about = "Keeps a game client install and the launcher itself up to date, \
                  preserving user data folders across every update."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, env = "LAUNCHKIT_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check for client and launcher updates
    Check(check::CheckCommand),

    /// Download and install a client update
    Update(update::UpdateCommand),

    /// Replace the launcher with its latest release
    SelfUpdate(self_update::SelfUpdateCommand),

    /// Show what is installed
    Status(status::StatusCommand),

    /// Run in the background, checking on the configured interval
    Watch(watch::WatchCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        config.init_logging(self.verbose || self.quiet);
        self.execute_with_config(config).await
    }

    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            None
        } else {
            Some("info".to_string())
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress,
            config_path: self.config.clone(),
        }
    }

    /// Run the selected command with an injected configuration.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        match self.command {
            Commands::Check(cmd) => cmd.execute(&config).await,
            Commands::Update(cmd) => cmd.execute(&config).await,
            Commands::SelfUpdate(cmd) => cmd.execute(&config).await,
            Commands::Status(cmd) => cmd.execute(&config).await,
            Commands::Watch(cmd) => cmd.execute(&config).await,
        }
    }
}
