//! Clock abstraction (C10), so decay/recall/maintenance logic is driven by an
//! injected time source instead of calling `SystemTime::now()` directly —
//! required for spec property P6 (deterministic recall under a fixed clock).

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current time as epoch seconds.
pub trait Clock: Send + Sync {
    /// Current time, epoch seconds.
    fn now(&self) -> i64;
}

/// Wall-clock time via [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// A deterministic, manually-advanced clock for tests (spec property P6).
#[derive(Debug, Clone)]
pub struct FixedClock(Arc<AtomicI64>);

impl FixedClock {
    /// Creates a clock starting at `now`.
    #[must_use]
    pub fn new(now: i64) -> Self {
        Self(Arc::new(AtomicI64::new(now)))
    }

    /// Advances the clock by `seconds` and returns the new value.
    pub fn advance(&self, seconds: i64) -> i64 {
        self.0.fetch_add(seconds, Ordering::SeqCst) + seconds
    }

    /// Sets the clock to an absolute value.
    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}
