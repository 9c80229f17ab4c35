//! The artifacts the launcher keeps up to date.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which artifact an update job concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// The game client installed under the install root.
    Client,
    /// The launcher executable itself.
    Launcher,
}

impl TargetKind {
    pub const ALL: [TargetKind; 2] = [TargetKind::Client, TargetKind::Launcher];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Launcher => "launcher",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
