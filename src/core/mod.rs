//! Core types shared by every layer: the error taxonomy and target kinds.

pub mod error;
pub mod target;

pub use error::{ErrorContext, ErrorKind, LauncherError, Result, user_friendly_error};
pub use target::TargetKind;
