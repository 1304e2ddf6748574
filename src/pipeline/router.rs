//! Log routing and failure throttling
//!
//! The router decides which log events reach storage. It applies the
//! severity filter and holds the failure latch that prevents the
//! "failed to write a log about a failed write" feedback loop: after the
//! first failed log flush, log persistence is disabled for the rest of the
//! process and the disabling event itself goes to the process's own
//! diagnostic output exactly once.

use crate::storage::LogLevel;

/// Severity filter plus one-shot failure latch for log persistence
#[derive(Debug)]
pub struct LogRouter {
    min_level: LogLevel,
    disabled: bool,
}

impl LogRouter {
    pub fn new(min_level: LogLevel) -> Self {
        Self {
            min_level,
            disabled: false,
        }
    }

    /// Whether an event of this severity should be persisted
    ///
    /// Events below the minimum severity are dropped before they reach the
    /// writer, as are all events once the failure latch has tripped.
    pub fn accept(&self, level: LogLevel) -> bool {
        !self.disabled && level >= self.min_level
    }

    /// Trips the failure latch after a failed log flush
    ///
    /// Emits the disabling event once to the diagnostic output; repeated
    /// calls are silent no-ops.
    pub fn latch_failure(&mut self, reason: &str) {
        if self.disabled {
            return;
        }
        self.disabled = true;
        tracing::warn!(
            "Log persistence disabled for the rest of the run: {}",
            reason
        );
    }

    /// Whether the failure latch has tripped
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }
}
