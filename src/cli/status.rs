//! Show what is installed, when it was last checked, and leftover quarantines.

use super::CliConfig;
use crate::config::LauncherConfig;
use crate::core::TargetKind;
use crate::engine::{ExecutionMode, install_root_for, quarantine_dir};
use crate::protection::{ProtectionManager, SnapshotHandle};
use crate::state::StateStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output format
    #[arg(long, default_value = "table", value_parser = ["table", "json"])]
    pub format: String,

    /// Restore protected data from quarantines left by interrupted updates
    #[arg(long)]
    pub recover: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub server_name: String,
    pub state_dir: PathBuf,
    pub targets: Vec<TargetStatus>,
}

#[derive(Debug, Serialize)]
pub struct TargetStatus {
    pub target: TargetKind,
    pub source: String,
    pub install_root: PathBuf,
    pub version: Option<String>,
    pub last_check: Option<DateTime<Utc>>,
    pub last_update: Option<DateTime<Utc>>,
    pub pending_quarantines: Vec<PathBuf>,
}

impl StatusCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let config = cli.load_launcher_config().await?;
        let mode = ExecutionMode::detect();

        if self.recover {
            recover_client(&config).await?;
        }

        let report = build_report(&config, &mode).await?;
        match self.format.as_str() {
            "json" => println!("{}", serde_json::to_string_pretty(&report)?),
            _ => print_table(&report),
        }
        Ok(())
    }
}

pub async fn build_report(config: &LauncherConfig, mode: &ExecutionMode) -> Result<StatusReport> {
    let state_dir = config.state_dir();
    let store = StateStore::new(&state_dir);

    let mut targets = Vec::new();
    for kind in TargetKind::ALL {
        let root = install_root_for(kind, config, mode);
        let state = store
            .load(kind, &root)
            .await
            .with_context(|| format!("Failed to load {kind} state"))?;

        let pending = ProtectionManager::new(quarantine_dir(&state_dir, kind))
            .pending_snapshots()?
            .into_iter()
            .map(|handle| handle.quarantine)
            .collect();

        let (source, version) = match kind {
            TargetKind::Client => (config.client.describe(), state.version.clone()),
            TargetKind::Launcher => (
                config
                    .launcher
                    .as_ref()
                    .map_or_else(|| "<self-update disabled>".to_string(), |s| s.describe()),
                state.version.clone().or_else(|| Some(config.launcher_version())),
            ),
        };

        targets.push(TargetStatus {
            target: kind,
            source,
            install_root: state.install_root,
            version,
            last_check: state.last_check,
            last_update: state.last_update,
            pending_quarantines: pending,
        });
    }

    Ok(StatusReport {
        server_name: config.server_name.clone(),
        state_dir,
        targets,
    })
}

/// Put quarantined client data back and remove the quarantine.
async fn recover_client(config: &LauncherConfig) -> Result<()> {
    let manager = ProtectionManager::new(quarantine_dir(&config.state_dir(), TargetKind::Client));
    let mut pending = manager.pending_snapshots()?;
    if pending.is_empty() {
        println!("{} No quarantined data to recover", "✓".green());
        return Ok(());
    }

    // Oldest first so the newest snapshot wins where they overlap.
    pending.sort_by_key(|handle: &SnapshotHandle| handle.created_at);
    for handle in pending {
        manager
            .restore(&handle.install_root, &handle)
            .await
            .with_context(|| format!("Failed to recover {}", handle.quarantine.display()))?;
        println!(
            "{} Restored {} path(s) from {}",
            "✓".green(),
            handle.entries.len(),
            handle.quarantine.display()
        );
        manager.discard(handle).await?;
    }
    Ok(())
}

fn print_table(report: &StatusReport) {
    println!("{}", report.server_name.bold());
    println!("  state: {}", report.state_dir.display());

    for target in &report.targets {
        println!();
        println!("{}", target.target.to_string().cyan().bold());
        println!("  source:       {}", target.source);
        println!("  location:     {}", target.install_root.display());
        println!("  version:      {}", target.version.as_deref().unwrap_or("not installed"));
        println!("  last check:   {}", format_time(target.last_check));
        println!("  last update:  {}", format_time(target.last_update));

        if !target.pending_quarantines.is_empty() {
            println!(
                "  {} {} quarantine(s) from an interrupted update; run {} to restore:",
                "!".yellow().bold(),
                target.pending_quarantines.len(),
                "launchkit status --recover".cyan()
            );
            for path in &target.pending_quarantines {
                println!("    {}", path.display());
            }
        }
    }
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map_or_else(|| "never".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}
