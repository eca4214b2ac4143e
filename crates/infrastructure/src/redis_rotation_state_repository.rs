//! Redis-backed rotation liveness records.

use async_trait::async_trait;
use qrotate_application::RotationStateRepository;
use qrotate_core::{AppError, AppResult};
use qrotate_domain::{RotationKey, RotationState};
use redis::{AsyncCommands, Script};

const COMPARE_AND_SWAP_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current then
  if ARGV[1] == '' then
    return 0
  end
  local revision = cjson.decode(current)['revision'] or 0
  if string.format('%d', revision) ~= ARGV[1] then
    return 0
  end
elseif ARGV[1] ~= '' then
  return 0
end
if ARGV[2] == '' then
  redis.call('DEL', KEYS[1])
else
  redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
end
return 1
"#;

/// Redis implementation of the rotation state port.
///
/// Each key holds one JSON record whose ttl is reset on every write. Writes
/// compare the stored `revision` inside a Lua script.
#[derive(Clone)]
pub struct RedisRotationStateRepository {
    client: redis::Client,
    key_prefix: String,
}

impl RedisRotationStateRepository {
    /// Creates a repository with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, key: &RotationKey) -> String {
        format!("{}:rotation:{}", self.key_prefix, key.scope())
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl RotationStateRepository for RedisRotationStateRepository {
    async fn find_state(&self, key: &RotationKey) -> AppResult<Option<RotationState>> {
        let mut connection = self.connection().await?;
        let encoded: Option<String> = connection.get(self.key_for(key)).await.map_err(|error| {
            AppError::Internal(format!("failed to read rotation state for '{key}': {error}"))
        })?;

        encoded
            .as_deref()
            .map(|value| {
                serde_json::from_str::<RotationState>(value).map_err(|error| {
                    AppError::Internal(format!(
                        "invalid rotation state stored for '{key}': {error}"
                    ))
                })
            })
            .transpose()
    }

    async fn compare_and_swap_state(
        &self,
        key: &RotationKey,
        expected_revision: Option<u64>,
        next: Option<&RotationState>,
        ttl_seconds: u32,
    ) -> AppResult<bool> {
        let value = match next {
            Some(state) if ttl_seconds > 0 => serde_json::to_string(state).map_err(|error| {
                AppError::Internal(format!(
                    "failed to encode rotation state for '{key}': {error}"
                ))
            })?,
            _ => String::new(),
        };
        let expected = expected_revision
            .map(|revision| revision.to_string())
            .unwrap_or_default();

        let mut connection = self.connection().await?;
        let applied: i32 = Script::new(COMPARE_AND_SWAP_SCRIPT)
            .key(self.key_for(key))
            .arg(expected)
            .arg(value)
            .arg(ttl_seconds)
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to write rotation state for '{key}': {error}"))
            })?;

        Ok(applied == 1)
    }

    async fn clear_state(&self, key: &RotationKey) -> AppResult<()> {
        let mut connection = self.connection().await?;
        connection
            .del::<_, ()>(self.key_for(key))
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to clear rotation state for '{key}': {error}"))
            })
    }
}
