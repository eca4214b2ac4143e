//! Redis-backed tick lease coordinator for rotation loops.

use async_trait::async_trait;
use qrotate_application::{RotationLeaseCoordinator, RotationTickLease};
use qrotate_core::{AppError, AppResult};
use redis::{AsyncCommands, ExistenceCheck, Script, SetExpiry, SetOptions};

const RELEASE_LEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

/// Redis implementation of rotation tick lease coordination.
#[derive(Clone)]
pub struct RedisRotationLeaseCoordinator {
    client: redis::Client,
    key_prefix: String,
}

impl RedisRotationLeaseCoordinator {
    /// Creates one coordinator adapter.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, scope_key: &str) -> String {
        format!("{}:tick_lease:{scope_key}", self.key_prefix)
    }
}

#[async_trait]
impl RotationLeaseCoordinator for RedisRotationLeaseCoordinator {
    async fn try_acquire_lease(
        &self,
        scope_key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<RotationTickLease>> {
        if scope_key.trim().is_empty() {
            return Err(AppError::Validation(
                "rotation tick lease scope_key must not be empty".to_owned(),
            ));
        }

        if holder_id.trim().is_empty() {
            return Err(AppError::Validation(
                "rotation tick lease holder_id must not be empty".to_owned(),
            ));
        }

        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "rotation tick lease_seconds must be greater than zero".to_owned(),
            ));
        }

        let key = self.key_for(scope_key);
        let token = format!("{holder_id}:{}", uuid::Uuid::new_v4());
        let options = SetOptions::default()
            .conditional_set(ExistenceCheck::NX)
            .with_expiration(SetExpiry::EX(u64::from(lease_seconds)));

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;

        let acquired: Option<String> = connection
            .set_options(key.as_str(), token.as_str(), options)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to acquire rotation tick lease: {error}"))
            })?;

        if acquired.is_none() {
            return Ok(None);
        }

        Ok(Some(RotationTickLease {
            scope_key: scope_key.to_owned(),
            token,
            holder_id: holder_id.to_owned(),
        }))
    }

    async fn release_lease(&self, lease: &RotationTickLease) -> AppResult<()> {
        let key = self.key_for(lease.scope_key.as_str());
        let script = Script::new(RELEASE_LEASE_SCRIPT);

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;

        script
            .key(key)
            .arg(lease.token.as_str())
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to release rotation tick lease: {error}"))
            })?;

        Ok(())
    }
}
