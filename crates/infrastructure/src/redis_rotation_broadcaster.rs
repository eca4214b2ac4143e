//! Redis pub/sub transport for rotation broadcasts.

use async_trait::async_trait;
use futures_util::StreamExt;
use qrotate_application::{
    RotationBroadcast, RotationBroadcaster, RotationEventSource, RotationSubscription,
};
use qrotate_core::{AppError, AppResult};
use qrotate_domain::RotationKey;
use redis::AsyncCommands;
use tracing::warn;

/// Publishes broadcasts as JSON envelopes on one Redis channel per key.
#[derive(Clone)]
pub struct RedisRotationBroadcaster {
    client: redis::Client,
    key_prefix: String,
}

impl RedisRotationBroadcaster {
    /// Creates a broadcaster with a configured Redis client and channel prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn redis_channel(&self, channel: &str) -> String {
        format!("{}:{channel}", self.key_prefix)
    }
}

#[async_trait]
impl RotationBroadcaster for RedisRotationBroadcaster {
    async fn publish(&self, broadcast: RotationBroadcast) -> AppResult<()> {
        let channel = self.redis_channel(broadcast.channel.as_str());
        let envelope = serde_json::to_string(&broadcast).map_err(|error| {
            AppError::Internal(format!("failed to encode rotation broadcast: {error}"))
        })?;

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;

        connection
            .publish::<_, _, ()>(channel, envelope)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to publish rotation broadcast: {error}"))
            })
    }
}

#[async_trait]
impl RotationEventSource for RedisRotationBroadcaster {
    async fn subscribe(&self, key: &RotationKey) -> AppResult<RotationSubscription> {
        let channel = self.redis_channel(key.channel_name().as_str());
        let mut pubsub = self.client.get_async_pubsub().await.map_err(|error| {
            AppError::Internal(format!("failed to open redis subscription: {error}"))
        })?;

        pubsub.subscribe(channel.as_str()).await.map_err(|error| {
            AppError::Internal(format!("failed to subscribe to '{channel}': {error}"))
        })?;

        Ok(pubsub
            .into_on_message()
            .filter_map(|message| async move {
                let payload = match message.get_payload::<String>() {
                    Ok(payload) => payload,
                    Err(error) => {
                        warn!(error = %error, "discarding unreadable rotation broadcast");
                        return None;
                    }
                };

                match serde_json::from_str::<RotationBroadcast>(payload.as_str()) {
                    Ok(broadcast) => Some(broadcast),
                    Err(error) => {
                        warn!(error = %error, "discarding malformed rotation broadcast");
                        None
                    }
                }
            })
            .boxed())
    }
}
