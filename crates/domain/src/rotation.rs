use std::fmt::{Display, Formatter};

use chrono::{DateTime, Duration, Utc};
use qrotate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Default delay between two ticks of one rotation loop.
pub const DEFAULT_INTERVAL_SECONDS: u32 = 3;
/// Default heartbeat age at which a rotation loop terminates.
pub const DEFAULT_STALENESS_THRESHOLD_SECONDS: u32 = 13;
/// Default ttl of the cached rotation record.
pub const DEFAULT_LAST_SCAN_TTL_SECONDS: u32 = 600;
/// Default ttl of the per-key tick lease.
pub const DEFAULT_TICK_LEASE_SECONDS: u32 = 30;
/// Default upper bound for caller-requested intervals.
pub const DEFAULT_MAX_INTERVAL_SECONDS: u32 = 60;

const IDENTIFIER_MAX_LENGTH: usize = 64;

/// Identity of one independent rotation loop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRotationKey")]
pub struct RotationKey {
    business_id: String,
    company_id: String,
}

impl RotationKey {
    /// Creates a validated rotation key.
    pub fn new(business_id: impl Into<String>, company_id: impl Into<String>) -> AppResult<Self> {
        let business_id = validate_identifier("business_id", business_id.into())?;
        let company_id = validate_identifier("company_id", company_id.into())?;

        Ok(Self {
            business_id,
            company_id,
        })
    }

    /// Returns the business identifier.
    #[must_use]
    pub fn business_id(&self) -> &str {
        self.business_id.as_str()
    }

    /// Returns the company identifier.
    #[must_use]
    pub fn company_id(&self) -> &str {
        self.company_id.as_str()
    }

    /// Returns the cache scope suffix shared by every per-key store.
    #[must_use]
    pub fn scope(&self) -> String {
        format!("{}:{}", self.business_id, self.company_id)
    }

    /// Returns the broadcast channel subscribers listen on.
    #[must_use]
    pub fn channel_name(&self) -> String {
        format!("qr.{}.{}", self.business_id, self.company_id)
    }
}

impl Display for RotationKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}:{}", self.business_id, self.company_id)
    }
}

#[derive(Deserialize)]
struct RawRotationKey {
    business_id: String,
    company_id: String,
}

impl TryFrom<RawRotationKey> for RotationKey {
    type Error = AppError;

    fn try_from(value: RawRotationKey) -> Result<Self, Self::Error> {
        Self::new(value.business_id, value.company_id)
    }
}

fn validate_identifier(field_name: &str, value: String) -> AppResult<String> {
    let value = value.trim().to_owned();
    if value.is_empty() {
        return Err(AppError::Validation(format!(
            "{field_name} must not be empty"
        )));
    }

    if value.len() > IDENTIFIER_MAX_LENGTH {
        return Err(AppError::Validation(format!(
            "{field_name} must be at most {IDENTIFIER_MAX_LENGTH} characters"
        )));
    }

    if !value
        .chars()
        .all(|character| character.is_ascii_alphanumeric() || matches!(character, '-' | '_'))
    {
        return Err(AppError::Validation(format!(
            "{field_name} '{value}' may only contain ASCII letters, digits, '-' and '_'"
        )));
    }

    Ok(value)
}

/// Scheduling phase of one rotation loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationPhase {
    /// No tick is queued or executing.
    #[default]
    Idle,
    /// A tick is queued for future execution.
    Scheduled,
    /// A tick is currently executing.
    Running,
}

impl RotationPhase {
    /// Returns stable phase value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scheduled => "scheduled",
            Self::Running => "running",
        }
    }
}

/// Cache-resident liveness record of one rotation loop.
///
/// An absent record is equivalent to [`RotationState::default`]. Deleting the
/// record clears liveness, the running marker and the last scan at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationState {
    /// Externally asserted intent that rotation should continue.
    pub active: bool,
    /// Current scheduling phase; anything but idle marks the loop as running.
    pub phase: RotationPhase,
    /// Last heartbeat received from the requester.
    pub last_scan_at: Option<DateTime<Utc>>,
    /// Interval of the currently scheduled loop.
    pub interval_seconds: u32,
    /// Time the last tick started executing.
    pub last_tick_at: Option<DateTime<Utc>>,
    /// Time the phase last changed.
    pub phase_changed_at: Option<DateTime<Utc>>,
    /// Loop instance that owns the key; bumped whenever a fresh loop is scheduled.
    #[serde(default)]
    pub generation: u64,
    /// Write counter checked by compare-and-swap updates.
    #[serde(default)]
    pub revision: u64,
}

impl RotationState {
    /// Returns whether a loop instance is scheduled or executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.phase != RotationPhase::Idle
    }

    /// Returns time elapsed since the last heartbeat; an unknown heartbeat counts as now.
    #[must_use]
    pub fn staleness(&self, now: DateTime<Utc>) -> Duration {
        let last_scan_at = self.last_scan_at.unwrap_or(now);
        (now - last_scan_at).max(Duration::zero())
    }

    /// Returns whether the loop must terminate on its next tick.
    #[must_use]
    pub fn should_terminate(&self, now: DateTime<Utc>, settings: &RotationSettings) -> bool {
        !self.active || self.staleness(now) >= settings.staleness_threshold()
    }

    /// Returns whether the record claims a running loop that stopped making progress.
    ///
    /// A healthy loop changes phase at least once per interval plus one tick
    /// lease, so only a phase older than that plus the staleness threshold
    /// counts as orphaned.
    #[must_use]
    pub fn is_orphaned(&self, now: DateTime<Utc>, settings: &RotationSettings) -> bool {
        if !self.is_running() {
            return false;
        }

        let grace = Duration::seconds(
            i64::from(self.interval_seconds) + i64::from(settings.tick_lease_seconds()),
        ) + settings.staleness_threshold();

        self.phase_changed_at
            .is_none_or(|changed_at| now - changed_at >= grace)
    }

    /// Moves the record into one phase.
    pub fn transition_to(&mut self, phase: RotationPhase, now: DateTime<Utc>) {
        self.phase = phase;
        self.phase_changed_at = Some(now);
    }
}

/// Tunable timing of the rotation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationSettings {
    default_interval_seconds: u32,
    staleness_threshold_seconds: u32,
    last_scan_ttl_seconds: u32,
    tick_lease_seconds: u32,
    max_interval_seconds: u32,
}

impl RotationSettings {
    /// Creates validated rotation settings.
    pub fn new(
        default_interval_seconds: u32,
        staleness_threshold_seconds: u32,
        last_scan_ttl_seconds: u32,
        tick_lease_seconds: u32,
        max_interval_seconds: u32,
    ) -> AppResult<Self> {
        for (name, value) in [
            ("default_interval_seconds", default_interval_seconds),
            ("staleness_threshold_seconds", staleness_threshold_seconds),
            ("last_scan_ttl_seconds", last_scan_ttl_seconds),
            ("tick_lease_seconds", tick_lease_seconds),
            ("max_interval_seconds", max_interval_seconds),
        ] {
            if value == 0 {
                return Err(AppError::Validation(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        if default_interval_seconds > max_interval_seconds {
            return Err(AppError::Validation(format!(
                "default_interval_seconds ({default_interval_seconds}) must not exceed max_interval_seconds ({max_interval_seconds})"
            )));
        }

        if last_scan_ttl_seconds < staleness_threshold_seconds {
            return Err(AppError::Validation(format!(
                "last_scan_ttl_seconds ({last_scan_ttl_seconds}) must be at least staleness_threshold_seconds ({staleness_threshold_seconds})"
            )));
        }

        Ok(Self {
            default_interval_seconds,
            staleness_threshold_seconds,
            last_scan_ttl_seconds,
            tick_lease_seconds,
            max_interval_seconds,
        })
    }

    /// Returns the interval used when a caller does not request one.
    #[must_use]
    pub fn default_interval_seconds(&self) -> u32 {
        self.default_interval_seconds
    }

    /// Returns the heartbeat age at which the loop terminates.
    #[must_use]
    pub fn staleness_threshold_seconds(&self) -> u32 {
        self.staleness_threshold_seconds
    }

    /// Returns the heartbeat age at which the loop terminates.
    #[must_use]
    pub fn staleness_threshold(&self) -> Duration {
        Duration::seconds(i64::from(self.staleness_threshold_seconds))
    }

    /// Returns the ttl applied to every rotation record write.
    #[must_use]
    pub fn last_scan_ttl_seconds(&self) -> u32 {
        self.last_scan_ttl_seconds
    }

    /// Returns the ttl of one tick lease.
    #[must_use]
    pub fn tick_lease_seconds(&self) -> u32 {
        self.tick_lease_seconds
    }

    /// Returns the largest interval a caller may request.
    #[must_use]
    pub fn max_interval_seconds(&self) -> u32 {
        self.max_interval_seconds
    }

    /// Resolves and validates a caller-requested interval.
    pub fn resolve_interval(&self, requested: Option<u32>) -> AppResult<u32> {
        let interval_seconds = requested.unwrap_or(self.default_interval_seconds);
        if interval_seconds == 0 || interval_seconds > self.max_interval_seconds {
            return Err(AppError::Validation(format!(
                "interval_seconds must be between 1 and {}",
                self.max_interval_seconds
            )));
        }

        Ok(interval_seconds)
    }
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            default_interval_seconds: DEFAULT_INTERVAL_SECONDS,
            staleness_threshold_seconds: DEFAULT_STALENESS_THRESHOLD_SECONDS,
            last_scan_ttl_seconds: DEFAULT_LAST_SCAN_TTL_SECONDS,
            tick_lease_seconds: DEFAULT_TICK_LEASE_SECONDS,
            max_interval_seconds: DEFAULT_MAX_INTERVAL_SECONDS,
        }
    }
}
