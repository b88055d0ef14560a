//! Time source for envelope timestamps.

use chrono::{DateTime, Utc};

/// Supplies the wall-clock time stamped onto outgoing envelopes.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system UTC clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
