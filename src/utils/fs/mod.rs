//! File system helpers used by the update pipeline.
//!
//! All helpers report failures as [`LauncherError`](crate::core::LauncherError) so that
//! disk-full and permission problems keep their kind all the way up to the shell.
//!
//! # Key Features
//!
//! - **Atomic writes**: state files are written to a temp file and renamed into place
//! - **Recursive copy**: protected folders are copied file by file with walkdir
//! - **Selective wipe**: the install root is cleared except for named entries

pub mod atomic;
pub mod dirs;

pub use atomic::atomic_write;
pub use dirs::{copy_tree, ensure_dir, remove_dir_contents_except, remove_path};
