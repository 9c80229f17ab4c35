//! Replace the launcher executable with its latest release.

use super::CliConfig;
use super::common::{ConsentPolicy, Session};
use crate::core::{LauncherError, TargetKind};
use crate::engine::ExecutionMode;
use anyhow::{Result, bail};
use clap::Args;

#[derive(Debug, Args)]
pub struct SelfUpdateCommand {
    /// Install without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

impl SelfUpdateCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let mut config = cli.load_launcher_config().await?;

        if config.launcher.is_none() {
            return Err(LauncherError::InvalidConfig {
                message: "no [launcher] release source is configured".to_string(),
            }
            .into());
        }
        ExecutionMode::detect().require_packaged()?;

        config.auto_update = false;
        if self.yes {
            config.unattended_self_install = true;
        }

        let mut session = Session::start(config, ConsentPolicy::Prompt, cli.no_progress).await?;
        let summary = session.run_job(TargetKind::Launcher).await?;
        session.shutdown().await?;

        if let Some(failure) = summary.failure() {
            bail!("launcher update failed: {}", failure.message);
        }
        Ok(())
    }
}
