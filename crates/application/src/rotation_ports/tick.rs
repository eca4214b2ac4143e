use std::time::Duration;

use chrono::{DateTime, Utc};
use qrotate_core::ConnectionId;
use qrotate_domain::{RotationKey, RotationPhase, RotationState};
use serde::{Deserialize, Serialize};

/// Task descriptor carried through the tick queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationTickJob {
    /// Rotation loop this tick belongs to.
    pub key: RotationKey,
    /// Delay between this tick and the next one.
    pub interval_seconds: u32,
    /// Connection that started the loop; excluded from broadcasts.
    pub origin: Option<ConnectionId>,
    /// Position of this tick within the loop, starting at zero.
    pub sequence: u64,
    /// Loop instance this tick belongs to.
    #[serde(default)]
    pub generation: u64,
}

impl RotationTickJob {
    /// Creates the first tick of a loop.
    #[must_use]
    pub fn first(
        key: RotationKey,
        interval_seconds: u32,
        origin: Option<ConnectionId>,
        generation: u64,
    ) -> Self {
        Self {
            key,
            interval_seconds,
            origin,
            sequence: 0,
            generation,
        }
    }

    /// Returns the tick that follows this one.
    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            key: self.key.clone(),
            interval_seconds: self.interval_seconds,
            origin: self.origin.clone(),
            sequence: self.sequence.saturating_add(1),
            generation: self.generation,
        }
    }

    /// Returns the configured delay between ticks.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_seconds))
    }
}

/// Why a rotation loop stopped rescheduling itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Liveness was withdrawn.
    Deactivated,
    /// The last heartbeat is older than the staleness threshold.
    Stale {
        /// Heartbeat age observed by the tick.
        staleness_seconds: i64,
    },
    /// The company has no active token.
    NoActiveToken,
    /// A newer loop instance owns the key.
    Superseded,
}

impl StopReason {
    /// Returns stable reason value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deactivated => "deactivated",
            Self::Stale { .. } => "stale",
            Self::NoActiveToken => "no_active_token",
            Self::Superseded => "superseded",
        }
    }
}

/// Result of one tick execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The loop continues after the delay.
    Rescheduled {
        /// Delay before the next tick.
        delay: Duration,
    },
    /// The loop terminated normally.
    Stopped(StopReason),
    /// Another worker holds the tick lease for this key.
    Skipped,
    /// The tick failed and the loop was terminated.
    Failed {
        /// Rendered failure.
        error: String,
    },
}

impl TickOutcome {
    /// Returns stable outcome value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rescheduled { .. } => "rescheduled",
            Self::Stopped(_) => "stopped",
            Self::Skipped => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Input for starting or keeping alive a rotation loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartRotationInput {
    /// Requested tick interval; the configured default when absent.
    pub interval_seconds: Option<u32>,
    /// Connection of the requester.
    pub origin: Option<ConnectionId>,
}

/// Snapshot of one rotation loop for callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationStatus {
    /// Rotation key.
    pub key: RotationKey,
    /// Scheduling phase.
    pub phase: RotationPhase,
    /// Liveness flag.
    pub active: bool,
    /// Last heartbeat.
    pub last_scan_at: Option<DateTime<Utc>>,
    /// Heartbeat age in whole seconds.
    pub staleness_seconds: i64,
    /// Interval of the scheduled loop.
    pub interval_seconds: u32,
    /// Start of the last executed tick.
    pub last_tick_at: Option<DateTime<Utc>>,
}

impl RotationStatus {
    /// Builds a snapshot from a stored record.
    #[must_use]
    pub fn from_state(key: RotationKey, state: &RotationState, now: DateTime<Utc>) -> Self {
        Self {
            key,
            phase: state.phase,
            active: state.active,
            last_scan_at: state.last_scan_at,
            staleness_seconds: state.staleness(now).num_seconds(),
            interval_seconds: state.interval_seconds,
            last_tick_at: state.last_tick_at,
        }
    }
}
