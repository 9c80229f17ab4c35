//! Shared plumbing for the engine-driven commands.

use crate::config::LauncherConfig;
use crate::core::TargetKind;
use crate::engine::{
    ChannelSink, CheckResult, Engine, EngineEvent, EngineHandle, ExecutionMode, Failure,
    JobOutcome, TriggerOutcome,
};
use crate::utils::progress::{MultiProgress, TransferBar};
use anyhow::{Result, bail};
use clap::ValueEnum;
use colored::Colorize;
use std::collections::HashMap;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

/// Target selection for commands that can act on either kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TargetArg {
    Client,
    Launcher,
    All,
}

impl TargetArg {
    pub fn kinds(self) -> &'static [TargetKind] {
        match self {
            Self::Client => &[TargetKind::Client],
            Self::Launcher => &[TargetKind::Launcher],
            Self::All => &TargetKind::ALL,
        }
    }
}

/// How the console answers consent requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentPolicy {
    Approve,
    Decline,
    /// Ask on stdin; decline when stdin is not a terminal.
    Prompt,
}

/// How one job ended, as seen by the console.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSummary {
    pub check: Option<CheckResult>,
    pub outcome: Option<JobOutcome>,
    /// Set when the launcher binary was replaced.
    pub restart: Option<(String, PathBuf)>,
}

impl JobSummary {
    /// The failure that ended the job, if any.
    pub fn failure(&self) -> Option<&Failure> {
        match (&self.check, &self.outcome) {
            (Some(CheckResult::Failed(failure)), _) | (_, Some(JobOutcome::Failed(failure))) => {
                Some(failure)
            }
            _ => None,
        }
    }

    pub fn update_available(&self) -> bool {
        matches!(self.check, Some(CheckResult::UpdateAvailable { .. }))
    }
}

/// A running engine plus the console renderer for its events.
pub struct Session {
    handle: EngineHandle,
    events: UnboundedReceiver<EngineEvent>,
    progress: MultiProgress,
    bars: HashMap<TargetKind, TransferBar>,
    policy: ConsentPolicy,
    server_name: String,
}

impl Session {
    pub async fn start(config: LauncherConfig, policy: ConsentPolicy, no_progress: bool) -> Result<Self> {
        let server_name = config.server_name.clone();
        let (sink, events) = ChannelSink::new();
        let handle = Engine::spawn(config, ExecutionMode::detect(), Arc::new(sink)).await?;

        Ok(Self {
            handle,
            events,
            progress: MultiProgress::with_hidden(no_progress || !std::io::stderr().is_terminal()),
            bars: HashMap::new(),
            policy,
            server_name,
        })
    }

    pub fn handle(&self) -> &EngineHandle {
        &self.handle
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Trigger a job for `kind` and render events until it ends.
    ///
    /// A trigger coalesced into an already running job follows that job instead.
    pub async fn run_job(&mut self, kind: TargetKind) -> Result<JobSummary> {
        match self.handle.request_check(kind) {
            TriggerOutcome::Started => debug!("{} check started", kind),
            TriggerOutcome::Coalesced => debug!("{} job already running; following it", kind),
            TriggerOutcome::Closed => bail!("update engine is not running"),
        }

        let mut summary = JobSummary::default();
        while let Some(event) = self.next_event().await {
            if event.target() != Some(kind) {
                continue;
            }
            match event {
                EngineEvent::CheckCompleted {
                    result,
                    ..
                } => {
                    let at_rest = !matches!(result, CheckResult::UpdateAvailable { .. });
                    summary.check = Some(result);
                    if at_rest {
                        return Ok(summary);
                    }
                }
                EngineEvent::SelfUpdateRequiresRestart {
                    version,
                    exe_path,
                } => summary.restart = Some((version, exe_path)),
                EngineEvent::JobCompleted {
                    outcome,
                    ..
                } => {
                    summary.outcome = Some(outcome);
                    return Ok(summary);
                }
                _ => {}
            }
        }

        bail!("update engine stopped before the {kind} job finished")
    }

    /// Receive the next event, render it, and answer consent requests.
    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        let event = self.events.recv().await?;
        self.render(&event);
        if let EngineEvent::ConsentRequested {
            target,
            current,
            available,
            description,
        } = &event
        {
            let approve = self.decide(*target, current.as_deref(), available, description).await;
            self.handle.consent(*target, approve);
        }
        Some(event)
    }

    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await?;
        Ok(())
    }

    fn render(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::StateChanged {
                target,
                state,
            } => debug!("{} is {}", target, state),
            EngineEvent::CheckStarted {
                target,
            } => self.println(format!("{} Checking {} for updates...", "→".cyan(), target)),
            EngineEvent::CheckCompleted {
                target,
                result,
            } => self.println(describe_check(*target, result)),
            EngineEvent::ConsentRequested {
                ..
            } => {}
            EngineEvent::Progress {
                target,
                bytes,
                total,
                ..
            } => {
                let progress = &self.progress;
                self.bars
                    .entry(*target)
                    .or_insert_with(|| progress.add_transfer(format!("Downloading {target}")))
                    .update(*bytes, *total);
            }
            EngineEvent::JobCompleted {
                target,
                outcome,
            } => {
                if let Some(bar) = self.bars.remove(target) {
                    bar.finish_and_clear();
                }
                for line in describe_outcome(*target, outcome) {
                    self.println(line);
                }
            }
            EngineEvent::SelfUpdateRequiresRestart {
                version,
                exe_path,
            } => self.println(format!(
                "{} Launcher {} installed at {}; restart launchkit to use it",
                "!".yellow().bold(),
                version,
                exe_path.display()
            )),
        }
    }

    async fn decide(
        &self,
        target: TargetKind,
        current: Option<&str>,
        available: &str,
        description: &str,
    ) -> bool {
        match self.policy {
            ConsentPolicy::Approve => true,
            ConsentPolicy::Decline => false,
            ConsentPolicy::Prompt => {
                if !std::io::stdin().is_terminal() {
                    self.println(format!(
                        "{} Not installing without confirmation (non-interactive); pass {} to install",
                        "!".yellow(),
                        "--yes".cyan()
                    ));
                    return false;
                }
                if !description.trim().is_empty() {
                    self.println(description.trim());
                }
                prompt(&format!(
                    "Install {} {} (currently {})? [y/N]:",
                    target,
                    available,
                    current.unwrap_or("not installed")
                ))
                .await
            }
        }
    }

    fn println(&self, line: impl AsRef<str>) {
        self.progress.println(line);
    }
}

/// One-line summary of a check result.
pub fn describe_check(target: TargetKind, result: &CheckResult) -> String {
    match result {
        CheckResult::UpToDate {
            version,
        } => format!(
            "{} {} is up to date ({})",
            "✓".green(),
            target,
            version.as_deref().unwrap_or("not installed")
        ),
        CheckResult::UpdateAvailable {
            current,
            available,
        } => format!(
            "{} {} update available: {} → {}",
            "↑".yellow().bold(),
            target,
            current.as_deref().unwrap_or("not installed"),
            available.green()
        ),
        CheckResult::Failed(failure) => describe_failure(&format!("{target} check failed"), failure),
    }
}

/// Lines describing how a job ended.
pub fn describe_outcome(target: TargetKind, outcome: &JobOutcome) -> Vec<String> {
    match outcome {
        JobOutcome::Installed {
            version,
        } => vec![format!("{} {} updated to {}", "✓".green(), target, version.green())],
        JobOutcome::Declined => vec![format!("{} {} update skipped", "-".dimmed(), target)],
        JobOutcome::Cancelled => vec![format!("{} {} update cancelled", "-".yellow(), target)],
        JobOutcome::Failed(failure) => {
            let mut lines = vec![describe_failure(&format!("{target} update failed"), failure)];
            if let Some(quarantine) = &failure.quarantine {
                lines.push(format!(
                    "  {} protected data is kept at {}",
                    "!".red().bold(),
                    quarantine.display()
                ));
            }
            lines
        }
    }
}

fn describe_failure(headline: &str, failure: &Failure) -> String {
    let mut line = format!("{} {} [{}]: {}", "✗".red(), headline, failure.kind, failure.message);
    if let Some(suggestion) = &failure.suggestion {
        line.push_str(&format!("\n  {}: {}", "suggestion".green(), suggestion));
    }
    line
}

async fn prompt(question: &str) -> bool {
    print!("{} ", question.green());
    if std::io::stdout().flush().is_err() {
        return false;
    }

    let mut reader = BufReader::new(tokio::io::stdin());
    let mut response = String::new();
    if reader.read_line(&mut response).await.is_err() {
        return false;
    }
    matches!(response.trim().to_lowercase().as_str(), "y" | "yes")
}
