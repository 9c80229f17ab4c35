//! Utility modules shared by the update pipeline and the console shell.
//!
//! - [`fs`]: atomic writes, recursive copies, selective directory wipes
//! - [`path_validation`]: lexical checks for archive entries and protected paths
//! - [`progress`]: indicatif rendering of transfer progress

pub mod fs;
pub mod path_validation;
pub mod progress;

pub use fs::{atomic_write, copy_tree, ensure_dir, remove_path};
pub use progress::{MultiProgress, TransferBar, format_bytes};
