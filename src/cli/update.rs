//! Check for and install a game client update.

use super::CliConfig;
use super::common::{ConsentPolicy, Session};
use crate::core::TargetKind;
use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;

#[derive(Debug, Args)]
pub struct UpdateCommand {
    /// Install without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

impl UpdateCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let mut config = cli.load_launcher_config().await?;
        config.auto_update = false;
        if self.yes {
            config.unattended_install = true;
        }

        let mut session = Session::start(config, ConsentPolicy::Prompt, cli.no_progress).await?;
        println!("{}", session.server_name().bold());

        let summary = session.run_job(TargetKind::Client).await?;
        session.shutdown().await?;

        if let Some(failure) = summary.failure() {
            bail!("client update failed: {}", failure.message);
        }
        Ok(())
    }
}
