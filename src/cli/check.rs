//! Report whether updates are available without installing anything.

use super::CliConfig;
use super::common::{ConsentPolicy, Session, TargetArg};
use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;

/// Exit status of `check --exit-code` when an update is available.
pub const UPDATE_AVAILABLE_EXIT: i32 = 2;

#[derive(Debug, Args)]
pub struct CheckCommand {
    /// What to check
    #[arg(long, value_enum, default_value = "all")]
    pub target: TargetArg,

    /// Exit with status 2 when an update is available
    #[arg(long)]
    pub exit_code: bool,
}

impl CheckCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let mut config = cli.load_launcher_config().await?;
        // A check never installs and never starts the background timer.
        config.auto_update = false;
        config.unattended_install = false;
        config.unattended_self_install = false;

        let mut session = Session::start(config, ConsentPolicy::Decline, cli.no_progress).await?;
        println!("{}", session.server_name().bold());

        let mut failed = Vec::new();
        let mut available = false;
        for &kind in self.target.kinds() {
            let summary = session.run_job(kind).await?;
            available |= summary.update_available();
            if summary.failure().is_some() {
                failed.push(kind.to_string());
            }
        }
        session.shutdown().await?;

        if !failed.is_empty() {
            bail!("update check failed for {}", failed.join(", "));
        }
        if available && self.exit_code {
            std::process::exit(UPDATE_AVAILABLE_EXIT);
        }
        Ok(())
    }
}
