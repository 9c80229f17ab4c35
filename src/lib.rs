//! launchkit - a self-updating game client launcher
//!
//! launchkit keeps a locally installed game client, and the launcher binary itself,
//! current with a remote release source. Updates replace the whole install while
//! preserving user-owned folders (settings, minimaps, character data).
//!
//! # Architecture Overview
//!
//! Every update runs the same pipeline, driven by a per-target worker in [`engine`]:
//!
//! 1. [`release`] resolves the newest published release (GitHub API or a direct link)
//! 2. [`version`] decides whether it is newer than what is installed
//! 3. [`download`] streams the artifact to a temp file, verifies it, and promotes it
//! 4. [`protection`] copies protected folders into a quarantine
//! 5. [`installer`] replaces the install root with the archive contents
//! 6. [`protection`] copies the protected folders back and drops the quarantine
//! 7. [`state`] records the installed version
//!
//! The launcher target swaps the running executable instead ([`selfupdate`]).
//!
//! # Guarantees
//!
//! - Protected data is never deleted: if it cannot be restored it stays in the
//!   quarantine, and the error names where
//! - A download never leaves a partial file at its destination
//! - A failed executable swap leaves the previous launcher in place
//! - At most one job per target runs at a time, across threads and processes
//!
//! # Core Modules
//!
//! - [`config`] - TOML configuration with documented defaults
//! - [`core`] - Error taxonomy and target kinds
//! - [`engine`] - Scheduler, job state machine, and shell events
//! - [`cli`] - Console shell built on the engine
//! - [`utils`] - Filesystem helpers, path validation, progress bars
//!
//! # Example
//!
//! ```rust,no_run
//! use launchkit::config::LauncherConfig;
//! use launchkit::core::TargetKind;
//! use launchkit::engine::{ChannelSink, Engine, ExecutionMode};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = LauncherConfig::load().await?;
//! let (sink, mut events) = ChannelSink::new();
//! let engine = Engine::spawn(config, ExecutionMode::detect(), Arc::new(sink)).await?;
//!
//! engine.request_check(TargetKind::Client);
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! engine.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod download;
pub mod engine;
pub mod installer;
pub mod protection;
pub mod release;
pub mod selfupdate;
pub mod state;
pub mod utils;
pub mod version;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
