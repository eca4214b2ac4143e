use super::*;

impl RotationService {
    /// Marks a key active and starts its loop unless one is already scheduled.
    ///
    /// Calling this on a running loop acts as a keep-alive and keeps the
    /// interval the loop was started with.
    pub async fn start_rotation(
        &self,
        key: RotationKey,
        input: StartRotationInput,
    ) -> AppResult<RotationStatus> {
        let interval_seconds = self.settings.resolve_interval(input.interval_seconds)?;
        let now = self.clock.now();

        let (state, needs_schedule, orphaned) = self
            .update_state(&key, |current| {
                let mut state = current.unwrap_or_default();
                state.active = true;
                state.last_scan_at = Some(now);

                let orphaned = state.is_orphaned(now, &self.settings);
                let needs_schedule = !state.is_running() || orphaned;
                if needs_schedule {
                    state.interval_seconds = interval_seconds;
                    state.generation = state.generation.wrapping_add(1);
                    state.transition_to(RotationPhase::Scheduled, now);
                }

                Ok((
                    StateChange::Save(state.clone()),
                    (state, needs_schedule, orphaned),
                ))
            })
            .await?;

        if !needs_schedule {
            return Ok(RotationStatus::from_state(key, &state, now));
        }

        if orphaned {
            warn!(
                business_id = %key.business_id(),
                company_id = %key.company_id(),
                generation = state.generation,
                "replacing orphaned rotation loop"
            );
        }

        let generation = state.generation;
        let job = RotationTickJob::first(key.clone(), interval_seconds, input.origin, generation);
        if let Err(error) = self.scheduler.schedule_tick(job, Duration::ZERO).await {
            let rollback = self
                .update_state(&key, |current| match current {
                    Some(mut state)
                        if state.generation == generation
                            && state.phase == RotationPhase::Scheduled =>
                    {
                        state.transition_to(RotationPhase::Idle, now);
                        Ok((StateChange::Save(state), ()))
                    }
                    _ => Ok((StateChange::Keep, ())),
                })
                .await;

            if let Err(rollback_error) = rollback {
                return Err(AppError::Internal(format!(
                    "failed to schedule rotation loop for '{key}': {error}; additionally failed to roll back rotation phase: {rollback_error}"
                )));
            }

            return Err(error);
        }

        info!(
            business_id = %key.business_id(),
            company_id = %key.company_id(),
            interval_seconds,
            generation,
            "rotation loop started"
        );

        Ok(RotationStatus::from_state(key, &state, now))
    }

    /// Refreshes the last scan of an active key.
    pub async fn heartbeat(&self, key: &RotationKey) -> AppResult<RotationStatus> {
        let now = self.clock.now();

        self.update_state(key, |current| {
            let mut state = current
                .filter(|state| state.active)
                .ok_or_else(|| AppError::NotFound(format!("no active rotation for '{key}'")))?;
            state.last_scan_at = Some(now);

            let status = RotationStatus::from_state(key.clone(), &state, now);
            Ok((StateChange::Save(state), status))
        })
        .await
    }

    /// Withdraws liveness; the next tick terminates the loop.
    pub async fn stop_rotation(&self, key: &RotationKey) -> AppResult<RotationStatus> {
        let now = self.clock.now();

        let (status, deactivated) = self
            .update_state(key, |current| {
                let Some(mut state) = current else {
                    let status =
                        RotationStatus::from_state(key.clone(), &RotationState::default(), now);
                    return Ok((StateChange::Keep, (status, false)));
                };

                if !state.active {
                    let status = RotationStatus::from_state(key.clone(), &state, now);
                    return Ok((StateChange::Keep, (status, false)));
                }

                state.active = false;
                let status = RotationStatus::from_state(key.clone(), &state, now);
                Ok((StateChange::Save(state), (status, true)))
            })
            .await?;

        if deactivated {
            info!(
                business_id = %key.business_id(),
                company_id = %key.company_id(),
                "rotation loop deactivated"
            );
        }

        Ok(status)
    }

    /// Returns the current state of one key.
    pub async fn rotation_status(&self, key: &RotationKey) -> AppResult<RotationStatus> {
        let now = self.clock.now();
        let state = self.load_state(key).await?;
        Ok(RotationStatus::from_state(key.clone(), &state, now))
    }
}
