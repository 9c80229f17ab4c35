//! Update scheduler: one worker per target kind, driven by a timer and by the shell.
//!
//! [`Engine::spawn`] starts a worker task for the game client and one for the
//! launcher. Each worker owns the job state of its target and runs at most one
//! job at a time; a check requested while a job is active is coalesced into it
//! rather than queued. The shell talks to the workers through [`EngineHandle`]
//! and hears back through an [`EventSink`].
//!
//! ```text
//! Idle ──check──▶ Checking ──▶ UpToDate | CheckFailed
//!                    │
//!                    ▼
//!            UpdateAvailable ──▶ AwaitingConsent ──decline/cancel──▶ Idle
//!                                      │
//!                                      ▼
//!                                 Downloading ──cancel──▶ Idle
//!                                      │
//!                                      ▼
//!                    Installing ──▶ RestoringProtected ──▶ Idle | Failed
//! ```

mod events;
mod state;
mod worker;

pub use events::{ChannelSink, CheckResult, EngineEvent, EventSink, Failure, JobOutcome};
pub use state::{CancelOutcome, EXECUTION_MODE_ENV, ExecutionMode, JobState, TriggerOutcome};

use crate::config::LauncherConfig;
use crate::core::{LauncherError, Result, TargetKind};
use crate::download::DownloadManager;
use crate::installer::ArchiveInstaller;
use crate::protection::ProtectionSet;
use crate::release::ReleaseResolver;
use crate::selfupdate::SelfReplacer;
use crate::state::{InstallState, StateStore};
use crate::utils::path_validation::is_within;
use state::Command;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use worker::Worker;

/// Services shared by both workers.
pub(crate) struct EngineContext {
    pub(crate) config: LauncherConfig,
    pub(crate) mode: ExecutionMode,
    pub(crate) resolver: ReleaseResolver,
    pub(crate) downloads: DownloadManager,
    pub(crate) installer: ArchiveInstaller,
    pub(crate) store: StateStore,
    pub(crate) protected: ProtectionSet,
    pub(crate) sink: Arc<dyn EventSink>,
}

pub struct Engine;

impl Engine {
    /// Load persisted state and start both workers.
    ///
    /// With `auto_update` set, each worker checks once at startup and then on every
    /// `check_interval_secs` tick.
    pub async fn spawn(
        config: LauncherConfig,
        mode: ExecutionMode,
        sink: Arc<dyn EventSink>,
    ) -> Result<EngineHandle> {
        config.validate()?;
        let protected = config.protection_set()?;
        let resolver = ReleaseResolver::new(config.resolver_options())?;
        let downloads = DownloadManager::new(resolver.client().clone());
        let store = StateStore::new(config.state_dir());

        if let ExecutionMode::Packaged {
            exe_path,
        } = &mode
        {
            ensure_outside_install_root(exe_path, &config.install_root())?;
            SelfReplacer::new(exe_path).cleanup_old();
        }

        let mut installs = Vec::with_capacity(TargetKind::ALL.len());
        for kind in TargetKind::ALL {
            let root = install_root_for(kind, &config, &mode);
            installs.push((kind, store.load(kind, &root).await?));
        }

        let startup_check = config.auto_update;
        let ctx = Arc::new(EngineContext {
            config,
            mode,
            resolver,
            downloads,
            installer: ArchiveInstaller::new(),
            store,
            protected,
            sink,
        });

        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut targets = Vec::with_capacity(installs.len());
        let mut tasks = Vec::with_capacity(installs.len());

        for (kind, install) in installs {
            debug!("{} installed version: {}", kind, install.version.as_deref().unwrap_or("none"));
            let state = Arc::new(watch::Sender::new(JobState::Idle));
            let install = Arc::new(watch::Sender::new(install));
            let (commands, commands_rx) = mpsc::unbounded_channel();

            let worker = Worker {
                kind,
                ctx: ctx.clone(),
                state: state.clone(),
                install: install.clone(),
                commands: commands_rx,
                shutdown: shutdown_rx.clone(),
            };
            tasks.push(tokio::spawn(worker.run(startup_check)));
            targets.push(TargetHandle {
                kind,
                state,
                install,
                commands,
            });
        }

        info!("Update engine started ({})", if ctx.mode.is_packaged() { "packaged" } else { "source" });
        Ok(EngineHandle {
            targets,
            shutdown,
            tasks,
        })
    }
}

/// Where a target's files live: the client install root, or the launcher's directory.
pub(crate) fn install_root_for(kind: TargetKind, config: &LauncherConfig, mode: &ExecutionMode) -> PathBuf {
    match (kind, mode) {
        (TargetKind::Client, _) => config.install_root(),
        (
            TargetKind::Launcher,
            ExecutionMode::Packaged {
                exe_path,
            },
        ) => exe_path.parent().map(PathBuf::from).unwrap_or_else(|| config.state_dir()),
        (TargetKind::Launcher, ExecutionMode::Source) => config.state_dir(),
    }
}

/// A client update empties its install root, so the launcher binary must live elsewhere.
fn ensure_outside_install_root(exe_path: &Path, install_root: &Path) -> Result<()> {
    let exe = exe_path.canonicalize().unwrap_or_else(|_| exe_path.to_path_buf());
    let root = install_root.canonicalize().unwrap_or_else(|_| install_root.to_path_buf());
    if is_within(&root, &exe) || is_within(install_root, exe_path) {
        return Err(LauncherError::InvalidConfig {
            message: format!(
                "launcher executable {} is inside the client install root {}; \
                 move it or choose a different install_root",
                exe_path.display(),
                install_root.display()
            ),
        });
    }
    Ok(())
}

/// Quarantine area for snapshots of `kind`'s protected data.
pub(crate) fn quarantine_dir(state_dir: &Path, kind: TargetKind) -> PathBuf {
    state_dir.join("quarantine").join(kind.as_str())
}

struct TargetHandle {
    kind: TargetKind,
    state: Arc<watch::Sender<JobState>>,
    install: Arc<watch::Sender<InstallState>>,
    commands: mpsc::UnboundedSender<Command>,
}

/// Shell-side control of a running engine.
pub struct EngineHandle {
    targets: Vec<TargetHandle>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    /// Ask for a check of `kind`. Coalesced when a job for `kind` is already active.
    pub fn request_check(&self, kind: TargetKind) -> TriggerOutcome {
        let Some(target) = self.target(kind) else {
            return TriggerOutcome::Closed;
        };
        if target.commands.is_closed() {
            return TriggerOutcome::Closed;
        }
        if !worker::claim(&target.state) {
            debug!("{} check coalesced into the running job", kind);
            return TriggerOutcome::Coalesced;
        }
        if target.commands.send(Command::Check).is_err() {
            target.state.send_replace(JobState::Idle);
            return TriggerOutcome::Closed;
        }
        TriggerOutcome::Started
    }

    /// Answer a pending consent request. Returns false when none is pending.
    pub fn consent(&self, kind: TargetKind, approve: bool) -> bool {
        let Some(target) = self.target(kind) else {
            return false;
        };
        if *target.state.borrow() != JobState::AwaitingConsent {
            debug!("{} consent ignored: no update awaiting consent", kind);
            return false;
        }
        target.commands.send(Command::Consent(approve)).is_ok()
    }

    /// Cancel the active job of `kind` where that is still safe.
    pub fn cancel(&self, kind: TargetKind) -> CancelOutcome {
        let Some(target) = self.target(kind) else {
            return CancelOutcome::NoActiveJob;
        };
        let state = *target.state.borrow();
        if state.is_cancellable() {
            if target.commands.send(Command::Cancel).is_ok() {
                CancelOutcome::Requested
            } else {
                CancelOutcome::NoActiveJob
            }
        } else if state.is_active() {
            debug!("{} cancel refused while {}", kind, state);
            CancelOutcome::Refused
        } else {
            CancelOutcome::NoActiveJob
        }
    }

    pub fn state(&self, kind: TargetKind) -> JobState {
        self.target(kind).map_or(JobState::Idle, |target| *target.state.borrow())
    }

    /// Watch state transitions of `kind`.
    pub fn subscribe(&self, kind: TargetKind) -> Option<watch::Receiver<JobState>> {
        self.target(kind).map(|target| target.state.subscribe())
    }

    /// Installed version and timestamps of `kind`, as last recorded by its worker.
    pub fn install_state(&self, kind: TargetKind) -> Option<InstallState> {
        self.target(kind).map(|target| target.install.borrow().clone())
    }

    /// Stop both workers.
    ///
    /// A pending consent is abandoned and a running download is cancelled; an
    /// install that already started runs to completion first.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.send_replace(true);
        drop(self.targets);
        for task in self.tasks {
            task.await.map_err(|e| {
                warn!("Engine worker ended abnormally: {}", e);
                LauncherError::Io {
                    operation: "stopping update engine".to_string(),
                    path: String::new(),
                    source: std::io::Error::other(e),
                }
            })?;
        }
        info!("Update engine stopped");
        Ok(())
    }

    fn target(&self, kind: TargetKind) -> Option<&TargetHandle> {
        self.targets.iter().find(|target| target.kind == kind)
    }
}
