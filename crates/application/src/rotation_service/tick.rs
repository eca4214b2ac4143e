use super::*;

impl RotationService {
    /// Executes one tick and enqueues the next one when the loop continues.
    ///
    /// Never returns an error: every failure runs [`Self::on_tick_failed`] and
    /// ends the loop, so a fresh start request is needed to resume.
    pub async fn process_tick(&self, job: RotationTickJob) -> TickOutcome {
        match self.run_tick(&job).await {
            Ok(TickOutcome::Rescheduled { delay }) => {
                match self.scheduler.schedule_tick(job.next(), delay).await {
                    Ok(()) => TickOutcome::Rescheduled { delay },
                    Err(error) => self.on_tick_failed(&job, error).await,
                }
            }
            Ok(outcome) => outcome,
            Err(error) => self.on_tick_failed(&job, error).await,
        }
    }

    /// Executes one tick body under the per-key tick lease.
    pub async fn run_tick(&self, job: &RotationTickJob) -> AppResult<TickOutcome> {
        let scope_key = job.key.scope();
        let Some(lease) = self
            .lease_coordinator
            .try_acquire_lease(
                scope_key.as_str(),
                self.holder_id.as_str(),
                self.settings.tick_lease_seconds(),
            )
            .await?
        else {
            debug!(
                business_id = %job.key.business_id(),
                company_id = %job.key.company_id(),
                sequence = job.sequence,
                "rotation tick skipped because its lease is held elsewhere"
            );
            return Ok(TickOutcome::Skipped);
        };

        let outcome = self.run_tick_body(job).await;

        if let Err(error) = self.lease_coordinator.release_lease(&lease).await {
            warn!(
                business_id = %job.key.business_id(),
                company_id = %job.key.company_id(),
                error = %error,
                "failed to release rotation tick lease"
            );
        }

        outcome
    }

    /// Failure hook: marks the loop idle so a later start is not blocked.
    pub async fn on_tick_failed(&self, job: &RotationTickJob, error: AppError) -> TickOutcome {
        warn!(
            business_id = %job.key.business_id(),
            company_id = %job.key.company_id(),
            sequence = job.sequence,
            error = %error,
            "rotation tick failed"
        );

        let cleanup = match self
            .set_loop_phase(job, RotationPhase::Idle, self.clock.now())
            .await
        {
            Ok(()) => Ok(()),
            Err(_) => self.state_repository.clear_state(&job.key).await,
        };

        if let Err(cleanup_error) = cleanup {
            warn!(
                business_id = %job.key.business_id(),
                company_id = %job.key.company_id(),
                error = %cleanup_error,
                "failed to clear running rotation after tick failure"
            );
        }

        TickOutcome::Failed {
            error: error.to_string(),
        }
    }

    async fn run_tick_body(&self, job: &RotationTickJob) -> AppResult<TickOutcome> {
        let key = &job.key;
        let now = self.clock.now();

        let begin = self
            .update_state(key, |current| {
                let mut state = match current {
                    Some(state) if state.generation != job.generation => {
                        return Ok((StateChange::Keep, TickBegin::Superseded));
                    }
                    Some(state) => state,
                    None => RotationState::default(),
                };

                if state.should_terminate(now, &self.settings) {
                    let reason = if state.active {
                        StopReason::Stale {
                            staleness_seconds: state.staleness(now).num_seconds(),
                        }
                    } else {
                        StopReason::Deactivated
                    };
                    return Ok((StateChange::Clear, TickBegin::Terminate(reason)));
                }

                // Re-assert the observed heartbeat with a fresh ttl; only heartbeats advance it.
                state.last_scan_at = Some(state.last_scan_at.unwrap_or(now));
                state.last_tick_at = Some(now);
                state.transition_to(RotationPhase::Running, now);
                Ok((StateChange::Save(state), TickBegin::Proceed))
            })
            .await?;

        match begin {
            TickBegin::Proceed => {}
            TickBegin::Superseded => {
                info!(
                    business_id = %key.business_id(),
                    company_id = %key.company_id(),
                    sequence = job.sequence,
                    generation = job.generation,
                    "rotation tick belongs to a replaced loop"
                );
                return Ok(TickOutcome::Stopped(StopReason::Superseded));
            }
            TickBegin::Terminate(reason) => {
                info!(
                    business_id = %key.business_id(),
                    company_id = %key.company_id(),
                    sequence = job.sequence,
                    reason = %reason.as_str(),
                    "rotation loop stopped"
                );
                return Ok(TickOutcome::Stopped(reason));
            }
        }

        let Some(company_token) = self.token_repository.find_active_token(key).await? else {
            self.set_loop_phase(job, RotationPhase::Idle, now).await?;
            info!(
                business_id = %key.business_id(),
                company_id = %key.company_id(),
                sequence = job.sequence,
                reason = %StopReason::NoActiveToken.as_str(),
                "rotation loop stopped"
            );
            return Ok(TickOutcome::Stopped(StopReason::NoActiveToken));
        };

        let session_token = generate_session_token()?;
        let token = CompositeToken::compose(&company_token, &session_token);
        self.broadcaster
            .publish(RotationBroadcast::token_rotated(
                key,
                &token,
                job.origin.clone(),
            ))
            .await?;

        debug!(
            business_id = %key.business_id(),
            company_id = %key.company_id(),
            sequence = job.sequence,
            "rotated qr token broadcast"
        );

        let now = self.clock.now();
        self.update_state(key, |current| match current {
            Some(state) if state.generation != job.generation => Ok((
                StateChange::Keep,
                TickOutcome::Stopped(StopReason::Superseded),
            )),
            Some(mut state) if state.active => {
                state.transition_to(RotationPhase::Scheduled, now);
                Ok((
                    StateChange::Save(state),
                    TickOutcome::Rescheduled {
                        delay: job.interval(),
                    },
                ))
            }
            Some(mut state) => {
                state.transition_to(RotationPhase::Idle, now);
                Ok((
                    StateChange::Save(state),
                    TickOutcome::Stopped(StopReason::Deactivated),
                ))
            }
            None => Ok((
                StateChange::Keep,
                TickOutcome::Stopped(StopReason::Deactivated),
            )),
        })
        .await
    }

    /// Moves the record into `phase` while this job's loop still owns the key.
    async fn set_loop_phase(
        &self,
        job: &RotationTickJob,
        phase: RotationPhase,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        self.update_state(&job.key, |current| match current {
            Some(mut state) if state.generation == job.generation => {
                state.transition_to(phase, now);
                Ok((StateChange::Save(state), ()))
            }
            _ => Ok((StateChange::Keep, ())),
        })
        .await
    }
}

/// What the first step of a tick decided.
enum TickBegin {
    Proceed,
    Superseded,
    Terminate(StopReason),
}
