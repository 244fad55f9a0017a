//! Injectable time source
//!
//! Throttle bookkeeping runs off a [`Clock`] rather than calling
//! `Utc::now()` directly so tests can simulate elapsed time
//! deterministically.

use chrono::{DateTime, Utc};

/// Supplies the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
