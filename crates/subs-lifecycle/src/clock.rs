//! Clock collaborators.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use subs_types::Timestamp;

use crate::ports::Clock;

/// Wall-clock time in whole seconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Timestamp::try_from(secs).unwrap_or(Timestamp::MAX)
    }
}

/// Externally driven clock. Clones share the same time, so a host can keep
/// a handle and advance the clock an engine reads from.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    /// A clock reading `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    /// Move the clock forward by `by` units (saturating). Returns the new
    /// time.
    pub fn advance(&self, by: Timestamp) -> Timestamp {
        let by = by.max(0);
        let previous = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
                Some(t.saturating_add(by))
            })
            .unwrap_or_else(|t| t);
        previous.saturating_add(by)
    }

    /// Move the clock to `t`. The clock never goes backwards; returns the
    /// resulting time.
    pub fn set(&self, t: Timestamp) -> Timestamp {
        let previous = self.now.fetch_max(t, Ordering::SeqCst);
        previous.max(t)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
