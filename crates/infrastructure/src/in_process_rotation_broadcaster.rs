use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use qrotate_application::{
    RotationBroadcast, RotationBroadcaster, RotationEventSource, RotationSubscription,
};
use qrotate_core::AppResult;
use qrotate_domain::RotationKey;
use tokio::sync::broadcast;
use tracing::warn;

/// Default buffered message count per subscriber.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// In-process fan-out of rotation broadcasts to every live subscriber.
pub struct InProcessRotationBroadcaster {
    sender: broadcast::Sender<RotationBroadcast>,
}

impl InProcessRotationBroadcaster {
    /// Creates a broadcaster buffering up to `capacity` messages per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InProcessRotationBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}

#[async_trait]
impl RotationBroadcaster for InProcessRotationBroadcaster {
    async fn publish(&self, broadcast: RotationBroadcast) -> AppResult<()> {
        // No subscribers is not an error; the tick still completes.
        let _ = self.sender.send(broadcast);
        Ok(())
    }
}

#[async_trait]
impl RotationEventSource for InProcessRotationBroadcaster {
    async fn subscribe(&self, key: &RotationKey) -> AppResult<RotationSubscription> {
        let receiver = self.sender.subscribe();
        let channel = key.channel_name();

        Ok(stream::unfold((receiver, channel), |(mut receiver, channel)| async move {
            loop {
                match receiver.recv().await {
                    Ok(message) if message.channel == channel => {
                        return Some((message, (receiver, channel)));
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(channel = %channel, skipped, "rotation subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use qrotate_application::{RotationBroadcast, RotationBroadcaster, RotationEventSource};
    use qrotate_domain::{CompanyToken, CompositeToken, RotationKey, SessionToken};

    use super::InProcessRotationBroadcaster;

    fn key(company_id: &str) -> RotationKey {
        RotationKey::new("7", company_id).unwrap_or_else(|_| unreachable!())
    }

    fn broadcast_for(key: &RotationKey, session: &str) -> RotationBroadcast {
        let token = CompositeToken::compose(
            &CompanyToken::new("company").unwrap_or_else(|_| unreachable!()),
            &SessionToken::new(session).unwrap_or_else(|_| unreachable!()),
        );
        RotationBroadcast::token_rotated(key, &token, None)
    }

    #[tokio::test]
    async fn subscriber_only_receives_its_own_channel() {
        let broadcaster = InProcessRotationBroadcaster::default();
        let subscription = broadcaster.subscribe(&key("42")).await;
        assert!(subscription.is_ok());
        let mut subscription = subscription.unwrap_or_else(|_| unreachable!());

        assert!(
            broadcaster
                .publish(broadcast_for(&key("43"), "AAAAAAAAAAAAAAAA"))
                .await
                .is_ok()
        );
        assert!(
            broadcaster
                .publish(broadcast_for(&key("42"), "BBBBBBBBBBBBBBBB"))
                .await
                .is_ok()
        );

        let received = subscription.next().await;
        assert_eq!(
            received.map(|message| message.payload.token),
            Some("company-BBBBBBBBBBBBBBBB".to_owned())
        );
    }

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let broadcaster = InProcessRotationBroadcaster::new(4);
        assert_eq!(broadcaster.subscriber_count(), 0);
        assert!(
            broadcaster
                .publish(broadcast_for(&key("42"), "AAAAAAAAAAAAAAAA"))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn dropping_subscription_releases_receiver() {
        let broadcaster = InProcessRotationBroadcaster::default();
        let subscription = broadcaster.subscribe(&key("42")).await;
        assert_eq!(broadcaster.subscriber_count(), 1);

        drop(subscription);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }
}
