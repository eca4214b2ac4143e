use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use qrotate_core::{AppError, AppResult};
use qrotate_domain::{CompositeToken, RotationKey, RotationPhase, RotationSettings, RotationState};
use tracing::{debug, info, warn};

use crate::rotation_ports::{
    CompanyTokenRepository, RotationBroadcast, RotationBroadcaster, RotationClock,
    RotationLeaseCoordinator, RotationStateRepository, RotationStatus, RotationTickJob,
    RotationTickScheduler, StartRotationInput, StopReason, SystemRotationClock, TickOutcome,
};
use crate::session_token::generate_session_token;

mod liveness;
mod tick;

const MAX_STATE_UPDATE_ATTEMPTS: usize = 8;

/// Write decided by one read-modify-write pass over a rotation record.
enum StateChange {
    Keep,
    Save(RotationState),
    Clear,
}

/// QR rotation loop and its liveness controller.
///
/// All loop state lives in the shared [`RotationStateRepository`], so any
/// process holding a service built on the same stores can run the next tick.
#[derive(Clone)]
pub struct RotationService {
    state_repository: Arc<dyn RotationStateRepository>,
    lease_coordinator: Arc<dyn RotationLeaseCoordinator>,
    token_repository: Arc<dyn CompanyTokenRepository>,
    broadcaster: Arc<dyn RotationBroadcaster>,
    scheduler: Arc<dyn RotationTickScheduler>,
    clock: Arc<dyn RotationClock>,
    settings: RotationSettings,
    holder_id: String,
}

impl RotationService {
    /// Creates a rotation service.
    #[must_use]
    pub fn new(
        state_repository: Arc<dyn RotationStateRepository>,
        lease_coordinator: Arc<dyn RotationLeaseCoordinator>,
        token_repository: Arc<dyn CompanyTokenRepository>,
        broadcaster: Arc<dyn RotationBroadcaster>,
        scheduler: Arc<dyn RotationTickScheduler>,
        settings: RotationSettings,
    ) -> Self {
        Self {
            state_repository,
            lease_coordinator,
            token_repository,
            broadcaster,
            scheduler,
            clock: Arc::new(SystemRotationClock),
            settings,
            holder_id: format!("rotation-{}", std::process::id()),
        }
    }

    /// Replaces the wall clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn RotationClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the identity recorded on acquired tick leases.
    #[must_use]
    pub fn with_holder_id(mut self, holder_id: impl Into<String>) -> Self {
        self.holder_id = holder_id.into();
        self
    }

    /// Returns the configured timing.
    #[must_use]
    pub fn settings(&self) -> &RotationSettings {
        &self.settings
    }

    async fn load_state(&self, key: &RotationKey) -> AppResult<RotationState> {
        Ok(self
            .state_repository
            .find_state(key)
            .await?
            .unwrap_or_default())
    }

    /// Reads the record, lets `decide` pick a write and applies it with
    /// compare-and-swap, re-reading on every lost race.
    async fn update_state<T, F>(&self, key: &RotationKey, mut decide: F) -> AppResult<T>
    where
        T: Send,
        F: FnMut(Option<RotationState>) -> AppResult<(StateChange, T)> + Send,
    {
        for attempt in 1..=MAX_STATE_UPDATE_ATTEMPTS {
            let current = self.state_repository.find_state(key).await?;
            let expected_revision = current.as_ref().map(|state| state.revision);
            let (change, value) = decide(current)?;

            let next = match change {
                StateChange::Keep => return Ok(value),
                StateChange::Save(mut state) => {
                    state.revision =
                        expected_revision.map_or(1, |revision| revision.wrapping_add(1));
                    Some(state)
                }
                StateChange::Clear => None,
            };

            if self
                .state_repository
                .compare_and_swap_state(
                    key,
                    expected_revision,
                    next.as_ref(),
                    self.settings.last_scan_ttl_seconds(),
                )
                .await?
            {
                return Ok(value);
            }

            debug!(
                business_id = %key.business_id(),
                company_id = %key.company_id(),
                attempt,
                "rotation record changed concurrently, retrying update"
            );
        }

        Err(AppError::Conflict(format!(
            "rotation record for '{key}' kept changing during update"
        )))
    }
}

#[cfg(test)]
mod tests;
