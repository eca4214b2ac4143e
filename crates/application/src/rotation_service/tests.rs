use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Mutex;

use qrotate_core::{AppError, AppResult, ConnectionId};
use qrotate_domain::{
    CompanyToken, RotationKey, RotationPhase, RotationSettings, RotationState,
    SESSION_TOKEN_LENGTH,
};

use crate::rotation_ports::{
    CompanyTokenRepository, RotationBroadcast, RotationBroadcaster, RotationClock,
    RotationLeaseCoordinator, RotationStateRepository, RotationTickJob, RotationTickLease,
    RotationTickScheduler, StartRotationInput, StopReason, TickOutcome,
};

use super::RotationService;

#[derive(Default)]
struct FakeStateRepository {
    states: Mutex<HashMap<RotationKey, RotationState>>,
    ttls: Mutex<Vec<u32>>,
    stop_after_next_read: Mutex<bool>,
}

#[async_trait]
impl RotationStateRepository for FakeStateRepository {
    async fn find_state(&self, key: &RotationKey) -> AppResult<Option<RotationState>> {
        let mut states = self.states.lock().await;
        let found = states.get(key).cloned();

        // Another process stops the loop right after this read returns.
        let mut stop_after_next_read = self.stop_after_next_read.lock().await;
        if *stop_after_next_read {
            *stop_after_next_read = false;
            if let Some(stored) = states.get_mut(key) {
                stored.active = false;
                stored.revision += 1;
            }
        }

        Ok(found)
    }

    async fn compare_and_swap_state(
        &self,
        key: &RotationKey,
        expected_revision: Option<u64>,
        next: Option<&RotationState>,
        ttl_seconds: u32,
    ) -> AppResult<bool> {
        let mut states = self.states.lock().await;
        if states.get(key).map(|state| state.revision) != expected_revision {
            return Ok(false);
        }

        match next {
            Some(state) => {
                states.insert(key.clone(), state.clone());
            }
            None => {
                states.remove(key);
            }
        }
        self.ttls.lock().await.push(ttl_seconds);
        Ok(true)
    }

    async fn clear_state(&self, key: &RotationKey) -> AppResult<()> {
        self.states.lock().await.remove(key);
        Ok(())
    }
}

#[derive(Default)]
struct FakeLeaseCoordinator {
    held: Mutex<HashSet<String>>,
}

#[async_trait]
impl RotationLeaseCoordinator for FakeLeaseCoordinator {
    async fn try_acquire_lease(
        &self,
        scope_key: &str,
        holder_id: &str,
        _lease_seconds: u32,
    ) -> AppResult<Option<RotationTickLease>> {
        if !self.held.lock().await.insert(scope_key.to_owned()) {
            return Ok(None);
        }

        Ok(Some(RotationTickLease {
            scope_key: scope_key.to_owned(),
            token: format!("{holder_id}:lease"),
            holder_id: holder_id.to_owned(),
        }))
    }

    async fn release_lease(&self, lease: &RotationTickLease) -> AppResult<()> {
        self.held.lock().await.remove(lease.scope_key.as_str());
        Ok(())
    }
}

#[derive(Default)]
struct FakeTokenRepository {
    token: Mutex<Option<String>>,
    fail: Mutex<bool>,
}

#[async_trait]
impl CompanyTokenRepository for FakeTokenRepository {
    async fn find_active_token(&self, _key: &RotationKey) -> AppResult<Option<CompanyToken>> {
        if *self.fail.lock().await {
            return Err(AppError::Internal(
                "simulated company token lookup failure".to_owned(),
            ));
        }

        self.token
            .lock()
            .await
            .clone()
            .map(CompanyToken::new)
            .transpose()
    }
}

#[derive(Default)]
struct FakeBroadcaster {
    published: Mutex<Vec<RotationBroadcast>>,
}

#[async_trait]
impl RotationBroadcaster for FakeBroadcaster {
    async fn publish(&self, broadcast: RotationBroadcast) -> AppResult<()> {
        self.published.lock().await.push(broadcast);
        Ok(())
    }
}

#[derive(Default)]
struct FakeScheduler {
    scheduled: Mutex<Vec<(RotationTickJob, Duration)>>,
    fail: Mutex<bool>,
}

impl FakeScheduler {
    async fn pop(&self) -> Option<(RotationTickJob, Duration)> {
        let mut scheduled = self.scheduled.lock().await;
        if scheduled.is_empty() {
            None
        } else {
            Some(scheduled.remove(0))
        }
    }
}

#[async_trait]
impl RotationTickScheduler for FakeScheduler {
    async fn schedule_tick(&self, job: RotationTickJob, delay: Duration) -> AppResult<()> {
        if *self.fail.lock().await {
            return Err(AppError::Internal("simulated queue outage".to_owned()));
        }

        self.scheduled.lock().await.push((job, delay));
        Ok(())
    }
}

struct ManualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

impl ManualClock {
    fn at(seconds: i64) -> Self {
        Self {
            now: std::sync::Mutex::new(epoch(seconds)),
        }
    }

    fn advance(&self, delay: Duration) {
        let step = chrono::Duration::from_std(delay).unwrap_or_else(|_| unreachable!());
        let mut now = self
            .now
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += step;
    }
}

impl RotationClock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self
            .now
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn epoch(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + seconds, 0)
        .single()
        .unwrap_or_else(|| unreachable!())
}

struct Harness {
    service: RotationService,
    states: Arc<FakeStateRepository>,
    leases: Arc<FakeLeaseCoordinator>,
    tokens: Arc<FakeTokenRepository>,
    broadcaster: Arc<FakeBroadcaster>,
    scheduler: Arc<FakeScheduler>,
    clock: Arc<ManualClock>,
}

impl Harness {
    async fn new() -> Self {
        let states = Arc::new(FakeStateRepository::default());
        let leases = Arc::new(FakeLeaseCoordinator::default());
        let tokens = Arc::new(FakeTokenRepository::default());
        let broadcaster = Arc::new(FakeBroadcaster::default());
        let scheduler = Arc::new(FakeScheduler::default());
        let clock = Arc::new(ManualClock::at(0));
        *tokens.token.lock().await = Some("company-secret".to_owned());

        let service = RotationService::new(
            states.clone(),
            leases.clone(),
            tokens.clone(),
            broadcaster.clone(),
            scheduler.clone(),
            RotationSettings::default(),
        )
        .with_clock(clock.clone())
        .with_holder_id("worker-test");

        Self {
            service,
            states,
            leases,
            tokens,
            broadcaster,
            scheduler,
            clock,
        }
    }

    async fn state(&self) -> Option<RotationState> {
        self.states.states.lock().await.get(&key()).cloned()
    }

    async fn put_state(&self, state: RotationState) {
        self.states.states.lock().await.insert(key(), state);
    }

    async fn start(&self, origin: Option<&str>) -> RotationTickJob {
        self.start_with_interval(origin, None).await
    }

    async fn start_with_interval(
        &self,
        origin: Option<&str>,
        interval_seconds: Option<u32>,
    ) -> RotationTickJob {
        let started = self
            .service
            .start_rotation(
                key(),
                StartRotationInput {
                    interval_seconds,
                    origin: origin.map(connection),
                },
            )
            .await;
        assert!(started.is_ok());

        let scheduled = self.scheduler.pop().await;
        assert!(scheduled.is_some());
        let (job, delay) = scheduled.unwrap_or_else(|| unreachable!());
        assert_eq!(delay, Duration::ZERO);
        job
    }
}

fn key() -> RotationKey {
    RotationKey::new("17", "42").unwrap_or_else(|_| unreachable!())
}

fn connection(value: &str) -> ConnectionId {
    ConnectionId::new(value).unwrap_or_else(|_| unreachable!())
}

#[tokio::test]
async fn start_rotation_activates_key_and_schedules_first_tick() {
    let harness = Harness::new().await;

    let job = harness.start(Some("socket-1")).await;

    assert_eq!(job.key, key());
    assert_eq!(job.sequence, 0);
    assert_eq!(job.interval_seconds, 3);
    assert_eq!(job.origin, Some(connection("socket-1")));

    let state = harness.state().await.unwrap_or_default();
    assert!(state.active);
    assert_eq!(state.phase, RotationPhase::Scheduled);
    assert_eq!(state.last_scan_at, Some(epoch(0)));
    assert_eq!(harness.states.ttls.lock().await.last().copied(), Some(600));
}

#[tokio::test]
async fn start_on_scheduled_loop_only_refreshes_liveness() {
    let harness = Harness::new().await;
    harness.start(None).await;

    harness.clock.advance(Duration::from_secs(2));
    let status = harness
        .service
        .start_rotation(
            key(),
            StartRotationInput {
                interval_seconds: Some(9),
                origin: None,
            },
        )
        .await;

    assert!(status.is_ok());
    let status = status.unwrap_or_else(|_| unreachable!());
    assert_eq!(status.phase, RotationPhase::Scheduled);
    assert_eq!(status.interval_seconds, 3);
    assert_eq!(status.last_scan_at, Some(epoch(2)));
    assert!(harness.scheduler.scheduled.lock().await.is_empty());
}

#[tokio::test]
async fn start_rejects_interval_outside_configured_bounds() {
    let harness = Harness::new().await;

    let result = harness
        .service
        .start_rotation(
            key(),
            StartRotationInput {
                interval_seconds: Some(0),
                origin: None,
            },
        )
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(harness.state().await.is_none());
}

#[tokio::test]
async fn start_replaces_orphaned_loop() {
    let harness = Harness::new().await;
    let mut orphan = RotationState {
        active: true,
        interval_seconds: 3,
        ..RotationState::default()
    };
    orphan.transition_to(RotationPhase::Running, epoch(0));
    harness.put_state(orphan).await;

    harness.clock.advance(Duration::from_secs(60));
    let job = harness.start(None).await;

    assert_eq!(job.sequence, 0);
    assert_eq!(job.generation, 1);
    let state = harness.state().await.unwrap_or_default();
    assert_eq!(state.phase, RotationPhase::Scheduled);
    assert_eq!(state.phase_changed_at, Some(epoch(60)));
    assert_eq!(state.generation, 1);
}

#[tokio::test]
async fn keep_alive_on_slow_loop_does_not_start_second_chain() {
    let harness = Harness::new().await;
    let job = harness.start_with_interval(None, Some(20)).await;

    let outcome = harness.service.process_tick(job).await;
    assert_eq!(
        outcome,
        TickOutcome::Rescheduled {
            delay: Duration::from_secs(20)
        }
    );
    assert_eq!(harness.scheduler.scheduled.lock().await.len(), 1);

    harness.clock.advance(Duration::from_secs(14));
    let kept_alive = harness
        .service
        .start_rotation(key(), StartRotationInput::default())
        .await;

    assert!(kept_alive.is_ok());
    let scheduled = harness.scheduler.scheduled.lock().await.clone();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].0.sequence, 1);
    assert_eq!(harness.state().await.unwrap_or_default().generation, 1);
}

#[tokio::test]
async fn tick_of_replaced_loop_stops_without_touching_new_loop() {
    let harness = Harness::new().await;
    let mut orphan = RotationState {
        active: true,
        interval_seconds: 3,
        generation: 4,
        ..RotationState::default()
    };
    orphan.transition_to(RotationPhase::Scheduled, epoch(0));
    harness.put_state(orphan).await;

    harness.clock.advance(Duration::from_secs(60));
    let replacement = harness.start(None).await;
    assert_eq!(replacement.generation, 5);

    let late = RotationTickJob::first(key(), 3, None, 4).next();
    let outcome = harness.service.process_tick(late).await;

    assert_eq!(outcome, TickOutcome::Stopped(StopReason::Superseded));
    assert!(harness.broadcaster.published.lock().await.is_empty());
    assert!(harness.scheduler.scheduled.lock().await.is_empty());
    let state = harness.state().await.unwrap_or_default();
    assert_eq!(state.generation, 5);
    assert_eq!(state.phase, RotationPhase::Scheduled);
    assert!(state.active);
}

#[tokio::test]
async fn stop_landing_during_tick_is_not_overwritten() {
    let harness = Harness::new().await;
    let job = harness.start(None).await;
    *harness.states.stop_after_next_read.lock().await = true;

    let outcome = harness.service.process_tick(job).await;

    assert_eq!(outcome, TickOutcome::Stopped(StopReason::Deactivated));
    assert!(harness.state().await.is_none());
    assert!(harness.broadcaster.published.lock().await.is_empty());
    assert!(harness.scheduler.scheduled.lock().await.is_empty());
}

#[tokio::test]
async fn heartbeat_racing_with_stop_does_not_revive_loop() {
    let harness = Harness::new().await;
    harness.start(None).await;
    *harness.states.stop_after_next_read.lock().await = true;

    let result = harness.service.heartbeat(&key()).await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert!(!harness.state().await.unwrap_or_default().active);
}

#[tokio::test]
async fn start_rolls_back_phase_when_scheduling_fails() {
    let harness = Harness::new().await;
    *harness.scheduler.fail.lock().await = true;

    let result = harness
        .service
        .start_rotation(key(), StartRotationInput::default())
        .await;

    assert!(matches!(result, Err(AppError::Internal(_))));
    let state = harness.state().await.unwrap_or_default();
    assert_eq!(state.phase, RotationPhase::Idle);
    assert!(state.active);
}

#[tokio::test]
async fn tick_broadcasts_composite_token_to_others_and_reschedules() {
    let harness = Harness::new().await;
    let job = harness.start(Some("socket-1")).await;

    let outcome = harness.service.process_tick(job).await;

    assert_eq!(
        outcome,
        TickOutcome::Rescheduled {
            delay: Duration::from_secs(3)
        }
    );

    let published = harness.broadcaster.published.lock().await.clone();
    assert_eq!(published.len(), 1);
    let message = &published[0];
    assert_eq!(message.channel, "qr.17.42");
    assert_eq!(message.event, "qr.token.rotated");
    assert_eq!(message.payload.business_id, "17");
    assert_eq!(message.payload.company_id, "42");
    assert_eq!(message.except, Some(connection("socket-1")));

    let session = message.payload.token.strip_prefix("company-secret-");
    assert!(session.is_some());
    let session = session.unwrap_or_default();
    assert_eq!(session.len(), SESSION_TOKEN_LENGTH);
    assert!(session.bytes().all(|byte| byte.is_ascii_alphanumeric()));

    let next = harness.scheduler.pop().await;
    assert!(next.is_some());
    let (next_job, delay) = next.unwrap_or_else(|| unreachable!());
    assert_eq!(next_job.sequence, 1);
    assert_eq!(next_job.origin, Some(connection("socket-1")));
    assert_eq!(delay, Duration::from_secs(3));

    let state = harness.state().await.unwrap_or_default();
    assert_eq!(state.phase, RotationPhase::Scheduled);
    assert_eq!(state.last_tick_at, Some(epoch(0)));
    assert!(harness.leases.held.lock().await.is_empty());
}

#[tokio::test]
async fn consecutive_ticks_publish_distinct_tokens() {
    let harness = Harness::new().await;
    let mut job = harness.start(None).await;

    for _ in 0..3 {
        harness.service.process_tick(job).await;
        let next = harness.scheduler.pop().await;
        assert!(next.is_some());
        let (next_job, delay) = next.unwrap_or_else(|| unreachable!());
        harness.clock.advance(delay);
        job = next_job;
    }

    let tokens: HashSet<String> = harness
        .broadcaster
        .published
        .lock()
        .await
        .iter()
        .map(|message| message.payload.token.clone())
        .collect();
    assert_eq!(tokens.len(), 3);
}

#[tokio::test]
async fn stale_heartbeat_clears_every_liveness_field_even_when_active() {
    let harness = Harness::new().await;
    let job = harness.start(None).await;

    harness.clock.advance(Duration::from_secs(13));
    let outcome = harness.service.process_tick(job).await;

    assert_eq!(
        outcome,
        TickOutcome::Stopped(StopReason::Stale {
            staleness_seconds: 13
        })
    );
    assert!(harness.state().await.is_none());
    assert!(harness.broadcaster.published.lock().await.is_empty());
    assert!(harness.scheduler.scheduled.lock().await.is_empty());
}

#[tokio::test]
async fn missing_record_counts_as_inactive() {
    let harness = Harness::new().await;
    let job = RotationTickJob::first(key(), 3, None, 0);

    let outcome = harness.service.process_tick(job).await;

    assert_eq!(outcome, TickOutcome::Stopped(StopReason::Deactivated));
    assert!(harness.state().await.is_none());
}

#[tokio::test]
async fn missing_last_scan_is_treated_as_now() {
    let harness = Harness::new().await;
    let mut state = RotationState {
        active: true,
        interval_seconds: 3,
        ..RotationState::default()
    };
    state.transition_to(RotationPhase::Scheduled, epoch(0));
    harness.put_state(state).await;

    let outcome = harness
        .service
        .process_tick(RotationTickJob::first(key(), 3, None, 0))
        .await;

    assert_eq!(
        outcome,
        TickOutcome::Rescheduled {
            delay: Duration::from_secs(3)
        }
    );
    let state = harness.state().await.unwrap_or_default();
    assert_eq!(state.last_scan_at, Some(epoch(0)));
}

#[tokio::test]
async fn missing_active_token_stops_loop_but_keeps_liveness() {
    let harness = Harness::new().await;
    *harness.tokens.token.lock().await = None;
    let job = harness.start(None).await;

    let outcome = harness.service.process_tick(job).await;

    assert_eq!(outcome, TickOutcome::Stopped(StopReason::NoActiveToken));
    let state = harness.state().await.unwrap_or_default();
    assert_eq!(state.phase, RotationPhase::Idle);
    assert!(state.active);
    assert!(harness.scheduler.scheduled.lock().await.is_empty());
    assert!(harness.broadcaster.published.lock().await.is_empty());
}

#[tokio::test]
async fn token_lookup_failure_clears_running_flag() {
    let harness = Harness::new().await;
    *harness.tokens.fail.lock().await = true;
    let job = harness.start(None).await;

    let outcome = harness.service.process_tick(job).await;

    assert!(matches!(outcome, TickOutcome::Failed { .. }));
    let state = harness.state().await.unwrap_or_default();
    assert!(!state.is_running());
    assert!(harness.scheduler.scheduled.lock().await.is_empty());
    assert!(harness.leases.held.lock().await.is_empty());
}

#[tokio::test]
async fn reschedule_failure_clears_running_flag() {
    let harness = Harness::new().await;
    let job = harness.start(None).await;
    *harness.scheduler.fail.lock().await = true;

    let outcome = harness.service.process_tick(job).await;

    assert!(matches!(outcome, TickOutcome::Failed { .. }));
    assert_eq!(
        harness.state().await.unwrap_or_default().phase,
        RotationPhase::Idle
    );
}

#[tokio::test]
async fn failed_loop_can_be_restarted() {
    let harness = Harness::new().await;
    *harness.tokens.fail.lock().await = true;
    let job = harness.start(None).await;
    harness.service.process_tick(job).await;

    *harness.tokens.fail.lock().await = false;
    let restarted = harness.start(None).await;

    assert_eq!(restarted.sequence, 0);
}

#[tokio::test]
async fn loop_reaches_idle_within_interval_plus_threshold_after_last_heartbeat() {
    let harness = Harness::new().await;
    let mut job = harness.start(None).await;
    let last_heartbeat = epoch(0);

    let outcome = loop {
        let outcome = harness.service.process_tick(job).await;
        let TickOutcome::Rescheduled { .. } = outcome else {
            break outcome;
        };

        let next = harness.scheduler.pop().await;
        assert!(next.is_some());
        let (next_job, delay) = next.unwrap_or_else(|| unreachable!());
        harness.clock.advance(delay);
        job = next_job;
    };

    assert!(matches!(outcome, TickOutcome::Stopped(StopReason::Stale { .. })));
    let elapsed = harness.clock.now() - last_heartbeat;
    assert!(elapsed <= chrono::Duration::seconds(3 + 13));
    assert_eq!(elapsed, chrono::Duration::seconds(15));
    assert!(harness.state().await.is_none());
}

#[tokio::test]
async fn heartbeats_keep_loop_rotating() {
    let harness = Harness::new().await;
    let mut job = harness.start(None).await;

    for _ in 0..10 {
        let outcome = harness.service.process_tick(job).await;
        assert!(matches!(outcome, TickOutcome::Rescheduled { .. }));

        let next = harness.scheduler.pop().await;
        let (next_job, delay) = next.unwrap_or_else(|| unreachable!());
        harness.clock.advance(delay);
        assert!(harness.service.heartbeat(&key()).await.is_ok());
        job = next_job;
    }

    assert_eq!(harness.broadcaster.published.lock().await.len(), 10);
}

#[tokio::test]
async fn stop_rotation_terminates_on_next_tick() {
    let harness = Harness::new().await;
    let job = harness.start(None).await;

    let stopped = harness.service.stop_rotation(&key()).await;
    assert!(stopped.is_ok());
    assert!(!stopped.unwrap_or_else(|_| unreachable!()).active);

    let outcome = harness.service.process_tick(job).await;

    assert_eq!(outcome, TickOutcome::Stopped(StopReason::Deactivated));
    assert!(harness.state().await.is_none());
}

#[tokio::test]
async fn duplicate_delivery_is_skipped_while_lease_is_held() {
    let harness = Harness::new().await;
    let job = harness.start(None).await;
    harness.leases.held.lock().await.insert(key().scope());

    let outcome = harness.service.process_tick(job).await;

    assert_eq!(outcome, TickOutcome::Skipped);
    assert!(harness.broadcaster.published.lock().await.is_empty());
    assert_eq!(
        harness.state().await.unwrap_or_default().phase,
        RotationPhase::Scheduled
    );
}

#[tokio::test]
async fn heartbeat_requires_active_rotation() {
    let harness = Harness::new().await;

    let result = harness.service.heartbeat(&key()).await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn rotation_status_reports_staleness() {
    let harness = Harness::new().await;
    harness.start(None).await;
    harness.clock.advance(Duration::from_secs(5));

    let status = harness.service.rotation_status(&key()).await;

    assert!(status.is_ok());
    let status = status.unwrap_or_else(|_| unreachable!());
    assert_eq!(status.staleness_seconds, 5);
    assert!(status.active);
    assert_eq!(status.phase, RotationPhase::Scheduled);
}
