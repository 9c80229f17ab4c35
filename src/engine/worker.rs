//! The per-target worker: timer, trigger handling, and the update pipeline.

use super::events::{CheckResult, EngineEvent, Failure, JobOutcome};
use super::state::{Command, JobState};
use super::{EngineContext, quarantine_dir};
use crate::core::{LauncherError, Result, TargetKind};
use crate::download::{DownloadRequest, Progress, ProgressFn};
use crate::config::SourceConfig;
use crate::protection::{ProtectionManager, ProtectionSet};
use crate::release::ReleaseInfo;
use crate::selfupdate::SelfReplacer;
use crate::state::{InstallState, JobLock, write_version_marker};
use crate::utils::fs::remove_path;
use crate::version::{self, Version};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Move an at-rest target to `Checking`. Returns false if a job is already active.
pub(crate) fn claim(state: &watch::Sender<JobState>) -> bool {
    state.send_if_modified(|current| {
        if current.is_active() {
            false
        } else {
            *current = JobState::Checking;
            true
        }
    })
}

enum Wake {
    Shutdown,
    Command(Option<Command>),
    Tick,
}

enum Consent {
    Approved,
    Declined,
    Cancelled,
    Shutdown,
}

/// What a job installs, fixed when the check completes.
struct Plan {
    release: ReleaseInfo,
    protected: ProtectionSet,
}

pub(crate) struct Worker {
    pub(crate) kind: TargetKind,
    pub(crate) ctx: Arc<EngineContext>,
    pub(crate) state: Arc<watch::Sender<JobState>>,
    pub(crate) install: Arc<watch::Sender<InstallState>>,
    pub(crate) commands: mpsc::UnboundedReceiver<Command>,
    pub(crate) shutdown: watch::Receiver<bool>,
}

impl Worker {
    pub(crate) async fn run(mut self, startup_check: bool) {
        debug!("{} worker started", self.kind);

        if startup_check && claim(&self.state) {
            self.cycle().await;
        }

        let mut timer = self.ctx.config.check_interval().map(|period| {
            let mut timer = tokio::time::interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            timer
        });

        loop {
            let wake = tokio::select! {
                _ = self.shutdown.changed() => Wake::Shutdown,
                command = self.commands.recv() => Wake::Command(command),
                () = next_tick(&mut timer) => Wake::Tick,
            };

            match wake {
                Wake::Shutdown | Wake::Command(None) => break,
                Wake::Command(Some(Command::Check)) => {
                    if *self.state.borrow() == JobState::Checking {
                        self.cycle().await;
                    }
                }
                Wake::Command(Some(other)) => {
                    debug!("{}: ignoring {:?} with no active job", self.kind, other);
                }
                Wake::Tick => {
                    if claim(&self.state) {
                        debug!("{}: scheduled check", self.kind);
                        self.cycle().await;
                    }
                }
            }
        }

        debug!("{} worker stopped", self.kind);
    }

    /// One full job: check, consent, download, install, restore.
    async fn cycle(&mut self) {
        // Consent or cancel messages aimed at an earlier job
        while let Ok(stale) = self.commands.try_recv() {
            debug!("{}: dropping stale {:?}", self.kind, stale);
        }

        self.emit(EngineEvent::CheckStarted {
            target: self.kind,
        });
        self.set_state(JobState::Checking);

        let current = self.current_version();
        let plan = match self.check(current.as_deref()).await {
            Ok(Some(plan)) => plan,
            Ok(None) => {
                self.emit(EngineEvent::CheckCompleted {
                    target: self.kind,
                    result: CheckResult::UpToDate {
                        version: current,
                    },
                });
                self.set_state(JobState::UpToDate);
                return;
            }
            Err(e) => {
                if e.is_transient() {
                    warn!("{} check failed, next scheduled check retries: {}", self.kind, e);
                } else {
                    warn!("{} check failed: {}", self.kind, e);
                }
                self.emit(EngineEvent::CheckCompleted {
                    target: self.kind,
                    result: CheckResult::Failed(Failure::from(&e)),
                });
                self.set_state(JobState::CheckFailed);
                return;
            }
        };

        let release = &plan.release;
        info!(
            "{} update available: {} -> {}",
            self.kind,
            current.as_deref().unwrap_or("none"),
            release.version
        );
        self.set_state(JobState::UpdateAvailable);
        self.emit(EngineEvent::CheckCompleted {
            target: self.kind,
            result: CheckResult::UpdateAvailable {
                current: current.clone(),
                available: release.version.clone(),
            },
        });

        if !self.unattended() {
            self.set_state(JobState::AwaitingConsent);
            self.emit(EngineEvent::ConsentRequested {
                target: self.kind,
                current,
                available: release.version.clone(),
                description: release.description.clone(),
            });
            match self.await_consent().await {
                Consent::Approved => debug!("{}: update approved", self.kind),
                Consent::Declined => {
                    info!("{}: update declined", self.kind);
                    self.finish(JobOutcome::Declined, JobState::Idle);
                    return;
                }
                Consent::Cancelled => {
                    info!("{}: update abandoned", self.kind);
                    self.finish(JobOutcome::Cancelled, JobState::Idle);
                    return;
                }
                Consent::Shutdown => {
                    self.set_state(JobState::Idle);
                    return;
                }
            }
        }

        match self.apply(&plan).await {
            Ok(version) => {
                info!("{} updated to {}", self.kind, version);
                self.finish(
                    JobOutcome::Installed {
                        version,
                    },
                    JobState::Idle,
                );
            }
            Err(LauncherError::Cancelled) => {
                info!("{}: update cancelled", self.kind);
                self.finish(JobOutcome::Cancelled, JobState::Idle);
            }
            Err(e) => {
                error!("{} update failed: {}", self.kind, e);
                self.finish(JobOutcome::Failed(Failure::from(&e)), JobState::Failed);
            }
        }
    }

    /// Resolve the remote release; `None` when there is nothing newer.
    async fn check(&mut self, current: Option<&str>) -> Result<Option<Plan>> {
        let target = match self.kind {
            TargetKind::Client => Some(self.client_target().await?),
            TargetKind::Launcher if self.ctx.mode.is_packaged() => {
                self.ctx.config.launcher_source().map(|source| (source, ProtectionSet::default()))
            }
            TargetKind::Launcher => {
                debug!("Self-update skipped: not a packaged executable");
                None
            }
        };
        let Some((source, protected)) = target else {
            return Ok(None);
        };

        let release = self.ctx.resolver.resolve(&source).await?;

        let mut install = self.install.borrow().clone();
        install.record_check();
        if let Err(e) = self.ctx.store.save(self.kind, &install).await {
            warn!("Failed to record {} check time: {}", self.kind, e);
        }
        self.install.send_replace(install);

        let newer = current.is_none_or(|current| version::is_newer(current, &release.version));
        Ok(newer.then_some(Plan {
            release,
            protected,
        }))
    }

    /// Client source and protected folders, with server-published settings applied.
    async fn client_target(&self) -> Result<(SourceConfig, ProtectionSet)> {
        let source = self.ctx.config.client_source();
        let Some(url) = self.ctx.config.remote_config_url.as_deref() else {
            return Ok((source, self.ctx.protected.clone()));
        };

        match self.ctx.resolver.fetch_remote_config(url).await {
            Ok(remote) => {
                let protected = remote.protection_set(&self.ctx.protected)?;
                let source = remote.apply_to(&source);
                debug!(
                    "Remote config applied: source {}, {} protected folder(s)",
                    source.describe(),
                    protected.len()
                );
                Ok((source, protected))
            }
            Err(e) => {
                warn!("Remote config {} unavailable, using local settings: {}", url, e);
                Ok((source, self.ctx.protected.clone()))
            }
        }
    }

    async fn await_consent(&mut self) -> Consent {
        loop {
            let wake = tokio::select! {
                _ = self.shutdown.changed() => Wake::Shutdown,
                command = self.commands.recv() => Wake::Command(command),
            };
            match wake {
                Wake::Shutdown | Wake::Command(None) => return Consent::Shutdown,
                Wake::Command(Some(Command::Consent(true))) => return Consent::Approved,
                Wake::Command(Some(Command::Consent(false))) => return Consent::Declined,
                Wake::Command(Some(Command::Cancel)) => return Consent::Cancelled,
                Wake::Command(Some(Command::Check)) | Wake::Tick => {}
            }
        }
    }

    /// Download and install `release`; returns the installed version.
    async fn apply(&mut self, plan: &Plan) -> Result<String> {
        let release = &plan.release;
        // Waiting on another process's lock counts as downloading: cancel still applies.
        self.set_state(JobState::Downloading);
        let _lock = self.acquire_lock().await?;

        if self.kind == TargetKind::Client {
            // Another launcher process may have installed it while we waited.
            let root = self.ctx.config.install_root();
            let fresh = self.ctx.store.load(self.kind, &root).await?;
            let installed = fresh.installed_version();
            self.install.send_replace(fresh);
            if installed.is_some_and(|v| v >= Version::parse(&release.version)) {
                info!("{} {} already installed by another process", self.kind, release.version);
                return Ok(release.version.clone());
            }
        }

        let archive = self.download(release).await?;

        let result = match self.kind {
            TargetKind::Client => self.install_client(release, &plan.protected, &archive).await,
            TargetKind::Launcher => self.install_launcher(release, &archive).await,
        };

        if let Err(e) = remove_path(&archive) {
            warn!("Failed to remove downloaded {}: {}", archive.display(), e);
        }
        result.map(|()| release.version.clone())
    }

    /// Take the cross-process job lock, giving up on cancel or shutdown.
    async fn acquire_lock(&mut self) -> Result<JobLock> {
        let kind = self.kind;
        let ctx = self.ctx.clone();
        let acquire = ctx.store.lock(kind);
        tokio::pin!(acquire);

        loop {
            tokio::select! {
                lock = &mut acquire => return lock,
                command = self.commands.recv() => match command {
                    Some(Command::Cancel) | None => {
                        info!("{}: cancelled while waiting for the job lock", kind);
                        return Err(LauncherError::Cancelled);
                    }
                    Some(other) => debug!("{}: ignoring {:?} while waiting for the job lock", kind, other),
                },
                _ = self.shutdown.changed() => return Err(LauncherError::Cancelled),
            }
        }
    }

    async fn download(&mut self, release: &ReleaseInfo) -> Result<PathBuf> {
        let kind = self.kind;
        let destination =
            self.ctx.store.dir().join("downloads").join(kind.as_str()).join(&release.asset_name);

        let sink = self.ctx.sink.clone();
        let on_progress: ProgressFn = Arc::new(move |progress: Progress| {
            sink.emit(EngineEvent::Progress {
                target: kind,
                bytes: progress.bytes,
                total: progress.total,
                percent: progress.percent(),
            });
        });

        let bearer = if release.authenticated { self.ctx.config.token.clone() } else { None };
        let request = DownloadRequest::new(&release.download_url, destination)
            .with_checksum(release.checksum.clone())
            .with_size(release.size)
            .with_bearer_token(bearer);
        let session = self.ctx.downloads.start(request, on_progress);
        let token = session.cancel_token();
        let wait = session.wait();
        tokio::pin!(wait);

        loop {
            let cancelling = token.is_cancelled();
            tokio::select! {
                result = &mut wait => {
                    let path = result?;
                    if token.is_cancelled() {
                        // Finished in the same instant the cancel arrived; honour the cancel.
                        remove_path(&path)?;
                        return Err(LauncherError::Cancelled);
                    }
                    return Ok(path);
                }
                command = self.commands.recv(), if !cancelling => match command {
                    Some(Command::Cancel) | None => {
                        info!("{}: cancelling download", kind);
                        token.cancel();
                    }
                    Some(other) => debug!("{}: ignoring {:?} while downloading", kind, other),
                },
                _ = self.shutdown.changed(), if !cancelling => token.cancel(),
            }
        }
    }

    async fn install_client(
        &mut self,
        release: &ReleaseInfo,
        protected: &ProtectionSet,
        archive: &Path,
    ) -> Result<()> {
        let root = self.ctx.config.install_root();
        let manager = ProtectionManager::new(quarantine_dir(self.ctx.store.dir(), self.kind));

        self.set_state(JobState::Installing);
        let snapshot = manager.snapshot(&root, protected).await?;
        let installed = self.ctx.installer.install(archive, &root, protected).await;

        self.set_state(JobState::RestoringProtected);
        let restored = manager.restore(&root, &snapshot).await;

        match (installed, restored) {
            (Ok(report), Ok(())) => {
                debug!("{}: {} files installed, {} preserved", self.kind, report.files, snapshot.entries.len());
                discard(&manager, snapshot).await;
            }
            (Err(install_error), Ok(())) => {
                discard(&manager, snapshot).await;
                return Err(install_error);
            }
            (installed, Err(restore_error)) => {
                if let Err(install_error) = installed {
                    error!("{}: install failed before restore: {}", self.kind, install_error);
                }
                return Err(restore_error);
            }
        }

        write_version_marker(&root, &release.version).await?;
        self.commit_install(&release.version).await
    }

    async fn install_launcher(&mut self, release: &ReleaseInfo, download: &Path) -> Result<()> {
        let exe_path = self.ctx.mode.require_packaged()?.to_path_buf();

        self.set_state(JobState::Installing);
        let replacer = SelfReplacer::new(&exe_path);
        let staged = replacer.stage(download).await?;
        replacer.replace(&staged).await?;

        self.commit_install(&release.version).await?;
        self.emit(EngineEvent::SelfUpdateRequiresRestart {
            version: release.version.clone(),
            exe_path,
        });
        Ok(())
    }

    /// Persist the new version, then publish it to readers.
    async fn commit_install(&mut self, version: &str) -> Result<()> {
        let mut install = self.install.borrow().clone();
        install.record_install(version);
        self.ctx.store.save(self.kind, &install).await?;
        self.install.send_replace(install);
        Ok(())
    }

    fn current_version(&self) -> Option<String> {
        let recorded = self.install.borrow().version.clone();
        match self.kind {
            TargetKind::Client => recorded,
            TargetKind::Launcher => {
                let running = self.ctx.config.launcher_version();
                // A replaced binary that has not been restarted yet
                match recorded {
                    Some(recorded)
                        if Version::parse(&recorded) > Version::parse(&running) =>
                    {
                        Some(recorded)
                    }
                    _ => Some(running),
                }
            }
        }
    }

    fn unattended(&self) -> bool {
        match self.kind {
            TargetKind::Client => self.ctx.config.unattended_install,
            TargetKind::Launcher => self.ctx.config.unattended_self_install,
        }
    }

    fn set_state(&self, state: JobState) {
        let changed = self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
        debug!("{} -> {}", self.kind, state);
        // Checking is set by the trigger itself, so announce it regardless.
        if changed || state == JobState::Checking {
            self.emit(EngineEvent::StateChanged {
                target: self.kind,
                state,
            });
        }
    }

    fn finish(&self, outcome: JobOutcome, state: JobState) {
        self.emit(EngineEvent::JobCompleted {
            target: self.kind,
            outcome,
        });
        self.set_state(state);
    }

    fn emit(&self, event: EngineEvent) {
        self.ctx.sink.emit(event);
    }
}

async fn discard(manager: &ProtectionManager, snapshot: crate::protection::SnapshotHandle) {
    let dir = snapshot.quarantine.clone();
    if let Err(e) = manager.discard(snapshot).await {
        warn!("Failed to remove quarantine {}: {}", dir.display(), e);
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
