//! Redis sorted-set tick queue shared by API and worker processes.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use qrotate_application::{RotationTickJob, RotationTickScheduler};
use qrotate_core::{AppError, AppResult};
use redis::{AsyncCommands, Script};
use tracing::warn;

const CLAIM_DUE_TICKS_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, ARGV[2])
if #due > 0 then
  redis.call('ZREM', KEYS[1], unpack(due))
end
return due
"#;

/// Delayed tick queue scored by due time in milliseconds.
///
/// Claiming removes entries atomically, so each tick is delivered to at most
/// one worker.
#[derive(Clone)]
pub struct RedisRotationTickQueue {
    client: redis::Client,
    key_prefix: String,
}

impl RedisRotationTickQueue {
    /// Creates a queue adapter with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn queue_key(&self) -> String {
        format!("{}:ticks", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }

    /// Removes and returns up to `limit` ticks whose due time has passed.
    pub async fn claim_due(&self, limit: usize) -> AppResult<Vec<RotationTickJob>> {
        if limit == 0 {
            return Err(AppError::Validation(
                "rotation tick claim limit must be greater than zero".to_owned(),
            ));
        }

        let mut connection = self.connection().await?;
        let entries: Vec<String> = Script::new(CLAIM_DUE_TICKS_SCRIPT)
            .key(self.queue_key())
            .arg(Utc::now().timestamp_millis())
            .arg(limit)
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to claim due rotation ticks: {error}"))
            })?;

        Ok(entries
            .iter()
            .filter_map(|entry| match serde_json::from_str::<RotationTickJob>(entry) {
                Ok(job) => Some(job),
                Err(error) => {
                    warn!(error = %error, "discarding malformed rotation tick entry");
                    None
                }
            })
            .collect())
    }

    /// Returns the number of queued ticks, due or not.
    pub async fn pending_count(&self) -> AppResult<u64> {
        let mut connection = self.connection().await?;
        connection.zcard(self.queue_key()).await.map_err(|error| {
            AppError::Internal(format!("failed to count queued rotation ticks: {error}"))
        })
    }
}

#[async_trait]
impl RotationTickScheduler for RedisRotationTickQueue {
    async fn schedule_tick(&self, job: RotationTickJob, delay: Duration) -> AppResult<()> {
        let delay_ms = i64::try_from(delay.as_millis()).map_err(|_| {
            AppError::Validation(format!(
                "rotation tick delay {}ms is out of range",
                delay.as_millis()
            ))
        })?;
        let due_at_ms = Utc::now().timestamp_millis().saturating_add(delay_ms);
        let member = serde_json::to_string(&job).map_err(|error| {
            AppError::Internal(format!("failed to encode rotation tick: {error}"))
        })?;

        let mut connection = self.connection().await?;
        connection
            .zadd::<_, _, _, ()>(self.queue_key(), member, due_at_ms)
            .await
            .map_err(|error| AppError::Internal(format!("failed to enqueue rotation tick: {error}")))
    }
}
