//! qrotate tick worker runtime.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use qrotate_application::{RotationService, RotationTickJob, TickOutcome};
use qrotate_core::{AppError, AppResult};
use qrotate_domain::{
    DEFAULT_INTERVAL_SECONDS, DEFAULT_LAST_SCAN_TTL_SECONDS, DEFAULT_MAX_INTERVAL_SECONDS,
    DEFAULT_STALENESS_THRESHOLD_SECONDS, DEFAULT_TICK_LEASE_SECONDS, RotationSettings,
};
use qrotate_infrastructure::{
    PostgresCompanyTokenRepository, RedisRotationBroadcaster, RedisRotationLeaseCoordinator,
    RedisRotationStateRepository, RedisRotationTickQueue,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct WorkerConfig {
    redis_url: String,
    database_url: String,
    redis_key_prefix: String,
    worker_id: String,
    claim_limit: usize,
    poll_interval_ms: u64,
    rotation_settings: RotationSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TickSummary {
    rescheduled: u32,
    stopped: u32,
    skipped: u32,
    failed: u32,
}

impl TickSummary {
    fn from_outcomes(outcomes: &[TickOutcome]) -> Self {
        outcomes
            .iter()
            .fold(Self::default(), |mut summary, outcome| {
                match outcome {
                    TickOutcome::Rescheduled { .. } => {
                        summary.rescheduled = summary.rescheduled.saturating_add(1);
                    }
                    TickOutcome::Stopped(_) => summary.stopped = summary.stopped.saturating_add(1),
                    TickOutcome::Skipped => summary.skipped = summary.skipped.saturating_add(1),
                    TickOutcome::Failed { .. } => summary.failed = summary.failed.saturating_add(1),
                }
                summary
            })
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let redis_client = redis::Client::open(config.redis_url.as_str())
        .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    let tick_queue = RedisRotationTickQueue::new(
        redis_client.clone(),
        config.redis_key_prefix.as_str(),
    );
    let rotation_service = build_rotation_service(&config, redis_client, pool, tick_queue.clone());

    info!(
        worker_id = %config.worker_id,
        claim_limit = config.claim_limit,
        poll_interval_ms = config.poll_interval_ms,
        staleness_threshold_seconds = config.rotation_settings.staleness_threshold_seconds(),
        "qrotate-worker started"
    );

    loop {
        match tick_queue.claim_due(config.claim_limit).await {
            Ok(jobs) if jobs.is_empty() => {
                tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)).await;
            }
            Ok(jobs) => {
                debug!(
                    worker_id = %config.worker_id,
                    claimed_count = jobs.len(),
                    "claimed rotation ticks"
                );

                let outcomes = join_all(
                    jobs.into_iter()
                        .map(|job| run_tick(&rotation_service, config.worker_id.as_str(), job)),
                )
                .await;
                let summary = TickSummary::from_outcomes(&outcomes);

                debug!(
                    worker_id = %config.worker_id,
                    rescheduled = summary.rescheduled,
                    stopped = summary.stopped,
                    skipped = summary.skipped,
                    failed = summary.failed,
                    "rotation tick batch processed"
                );
            }
            Err(error) => {
                warn!(
                    worker_id = %config.worker_id,
                    error = %error,
                    "failed to claim rotation ticks"
                );
                tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)).await;
            }
        }
    }
}

async fn run_tick(service: &RotationService, worker_id: &str, job: RotationTickJob) -> TickOutcome {
    let business_id = job.key.business_id().to_owned();
    let company_id = job.key.company_id().to_owned();
    let sequence = job.sequence;
    let outcome = service.process_tick(job).await;

    match &outcome {
        TickOutcome::Stopped(reason) => info!(
            worker_id = %worker_id,
            business_id = %business_id,
            company_id = %company_id,
            sequence,
            reason = %reason.as_str(),
            "rotation loop finished"
        ),
        TickOutcome::Failed { error } => warn!(
            worker_id = %worker_id,
            business_id = %business_id,
            company_id = %company_id,
            sequence,
            error = %error,
            "rotation tick failed"
        ),
        TickOutcome::Rescheduled { .. } | TickOutcome::Skipped => {}
    }

    outcome
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

fn build_rotation_service(
    config: &WorkerConfig,
    redis_client: redis::Client,
    pool: PgPool,
    tick_queue: RedisRotationTickQueue,
) -> RotationService {
    let prefix = config.redis_key_prefix.as_str();

    RotationService::new(
        Arc::new(RedisRotationStateRepository::new(redis_client.clone(), prefix)),
        Arc::new(RedisRotationLeaseCoordinator::new(redis_client.clone(), prefix)),
        Arc::new(PostgresCompanyTokenRepository::new(pool)),
        Arc::new(RedisRotationBroadcaster::new(redis_client, prefix)),
        Arc::new(tick_queue),
        config.rotation_settings,
    )
    .with_holder_id(config.worker_id.as_str())
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let redis_url = required_env("REDIS_URL")?;
        let database_url = required_env("DATABASE_URL")?;
        let redis_key_prefix = env::var("REDIS_KEY_PREFIX")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "qrotate".to_owned());
        let worker_id = env::var("WORKER_ID")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("worker-{}", std::process::id()));
        let claim_limit = parse_env_usize("WORKER_CLAIM_LIMIT", 10)?;
        let poll_interval_ms = parse_env_u64("WORKER_POLL_INTERVAL_MS", 250)?;

        if claim_limit == 0 {
            return Err(AppError::Validation(
                "WORKER_CLAIM_LIMIT must be greater than zero".to_owned(),
            ));
        }

        if poll_interval_ms == 0 {
            return Err(AppError::Validation(
                "WORKER_POLL_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        let rotation_settings = RotationSettings::new(
            parse_env_u32("QR_DEFAULT_INTERVAL_SECONDS", DEFAULT_INTERVAL_SECONDS)?,
            parse_env_u32(
                "QR_STALENESS_THRESHOLD_SECONDS",
                DEFAULT_STALENESS_THRESHOLD_SECONDS,
            )?,
            parse_env_u32("QR_LAST_SCAN_TTL_SECONDS", DEFAULT_LAST_SCAN_TTL_SECONDS)?,
            parse_env_u32("QR_TICK_LEASE_SECONDS", DEFAULT_TICK_LEASE_SECONDS)?,
            parse_env_u32("QR_MAX_INTERVAL_SECONDS", DEFAULT_MAX_INTERVAL_SECONDS)?,
        )?;

        Ok(Self {
            redis_url,
            database_url,
            redis_key_prefix,
            worker_id,
            claim_limit,
            poll_interval_ms,
            rotation_settings,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
