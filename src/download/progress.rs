//! Transfer progress values and rate limiting of progress callbacks.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Callback receiving coalesced progress updates.
pub type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

/// Minimum interval between two progress callbacks, unless a whole percent passed.
const MIN_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub bytes: u64,
    pub total: Option<u64>,
}

impl Progress {
    /// Whole percent complete, when the total size is known.
    pub fn percent(&self) -> Option<u8> {
        match self.total {
            Some(0) => Some(100),
            Some(total) => Some(((self.bytes.min(total) * 100) / total) as u8),
            None => None,
        }
    }
}

/// A callback that never reports anything.
pub fn silent() -> ProgressFn {
    Arc::new(|_| {})
}

/// Emits a progress callback at most every 100ms or per whole percent.
pub(super) struct Throttle {
    callback: ProgressFn,
    total: Option<u64>,
    last_emit: Option<Instant>,
    last_percent: Option<u8>,
}

impl Throttle {
    pub(super) fn new(callback: ProgressFn, total: Option<u64>) -> Self {
        Self {
            callback,
            total,
            last_emit: None,
            last_percent: None,
        }
    }

    pub(super) fn update(&mut self, bytes: u64) {
        let progress = Progress {
            bytes,
            total: self.total,
        };
        let percent = progress.percent();
        let due = match self.last_emit {
            None => true,
            Some(at) => at.elapsed() >= MIN_INTERVAL || percent > self.last_percent,
        };
        if due {
            self.emit(progress);
        }
    }

    /// Final update, always delivered.
    pub(super) fn finish(&mut self, bytes: u64) {
        self.emit(Progress {
            bytes,
            total: self.total,
        });
    }

    fn emit(&mut self, progress: Progress) {
        self.last_emit = Some(Instant::now());
        self.last_percent = progress.percent();
        (self.callback)(progress);
    }
}
