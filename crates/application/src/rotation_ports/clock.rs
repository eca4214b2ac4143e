use chrono::{DateTime, Utc};

/// Time source for liveness decisions.
pub trait RotationClock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRotationClock;

impl RotationClock for SystemRotationClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
