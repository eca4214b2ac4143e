use async_trait::async_trait;
use futures_util::stream::BoxStream;
use qrotate_core::{AppResult, ConnectionId};
use qrotate_domain::{CompositeToken, RotationKey};
use serde::{Deserialize, Serialize};

/// Event name used for rotated QR tokens.
pub const QR_TOKEN_ROTATED_EVENT: &str = "qr.token.rotated";

/// Payload delivered to subscribers on every tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrTokenRotated {
    /// Composite token rendered into the QR code.
    pub token: String,
    /// Company the token belongs to.
    pub company_id: String,
    /// Business the company belongs to.
    pub business_id: String,
}

/// One message published on a rotation channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationBroadcast {
    /// Channel name, one per rotation key.
    pub channel: String,
    /// Event name.
    pub event: String,
    /// Event payload.
    pub payload: QrTokenRotated,
    /// Connection that must not receive its own echo.
    pub except: Option<ConnectionId>,
}

impl RotationBroadcast {
    /// Builds the rotated-token broadcast for one key.
    #[must_use]
    pub fn token_rotated(
        key: &RotationKey,
        token: &CompositeToken,
        except: Option<ConnectionId>,
    ) -> Self {
        Self {
            channel: key.channel_name(),
            event: QR_TOKEN_ROTATED_EVENT.to_owned(),
            payload: QrTokenRotated {
                token: token.as_str().to_owned(),
                company_id: key.company_id().to_owned(),
                business_id: key.business_id().to_owned(),
            },
            except,
        }
    }

    /// Returns whether a subscriber connection should receive this message.
    #[must_use]
    pub fn is_visible_to(&self, connection_id: Option<&ConnectionId>) -> bool {
        match (&self.except, connection_id) {
            (Some(except), Some(connection_id)) => except != connection_id,
            _ => true,
        }
    }
}

/// Publish/subscribe transport port.
#[async_trait]
pub trait RotationBroadcaster: Send + Sync {
    /// Publishes one message to every subscriber of its channel.
    async fn publish(&self, broadcast: RotationBroadcast) -> AppResult<()>;
}

/// Live stream of broadcasts for one channel.
pub type RotationSubscription = BoxStream<'static, RotationBroadcast>;

/// Subscriber side of the publish/subscribe transport.
#[async_trait]
pub trait RotationEventSource: Send + Sync {
    /// Subscribes to every broadcast published for one key from now on.
    async fn subscribe(&self, key: &RotationKey) -> AppResult<RotationSubscription>;
}
