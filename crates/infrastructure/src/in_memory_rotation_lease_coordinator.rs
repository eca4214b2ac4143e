use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use qrotate_application::{RotationLeaseCoordinator, RotationTickLease};
use qrotate_core::{AppError, AppResult};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct HeldLease {
    token: String,
    expires_at: Instant,
}

/// Process-local tick lease coordinator.
///
/// Only serializes ticks inside one process; deployments running several
/// processes use the Redis coordinator instead.
#[derive(Default)]
pub struct InMemoryRotationLeaseCoordinator {
    leases: Mutex<HashMap<String, HeldLease>>,
}

impl InMemoryRotationLeaseCoordinator {
    /// Creates a coordinator with no held leases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RotationLeaseCoordinator for InMemoryRotationLeaseCoordinator {
    async fn try_acquire_lease(
        &self,
        scope_key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<RotationTickLease>> {
        if scope_key.trim().is_empty() || holder_id.trim().is_empty() {
            return Err(AppError::Validation(
                "rotation tick lease scope_key and holder_id must not be empty".to_owned(),
            ));
        }

        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "rotation tick lease_seconds must be greater than zero".to_owned(),
            ));
        }

        let now = Instant::now();
        let mut leases = self.leases.lock().await;
        if leases
            .get(scope_key)
            .is_some_and(|held| held.expires_at > now)
        {
            return Ok(None);
        }

        let token = format!("{holder_id}:{}", uuid::Uuid::new_v4());
        let expires_at = now
            .checked_add(Duration::from_secs(u64::from(lease_seconds)))
            .unwrap_or(now);
        leases.insert(
            scope_key.to_owned(),
            HeldLease {
                token: token.clone(),
                expires_at,
            },
        );

        Ok(Some(RotationTickLease {
            scope_key: scope_key.to_owned(),
            token,
            holder_id: holder_id.to_owned(),
        }))
    }

    async fn release_lease(&self, lease: &RotationTickLease) -> AppResult<()> {
        let mut leases = self.leases.lock().await;
        if leases
            .get(lease.scope_key.as_str())
            .is_some_and(|held| held.token == lease.token)
        {
            leases.remove(lease.scope_key.as_str());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use qrotate_application::{RotationLeaseCoordinator, RotationTickLease};

    use super::InMemoryRotationLeaseCoordinator;

    #[tokio::test]
    async fn lease_is_exclusive_until_released() {
        let coordinator = InMemoryRotationLeaseCoordinator::new();

        let first = coordinator.try_acquire_lease("7:42", "api-1", 30).await;
        assert!(matches!(first, Ok(Some(_))));
        let second = coordinator.try_acquire_lease("7:42", "api-2", 30).await;
        assert!(matches!(second, Ok(None)));

        let lease = first.ok().flatten().unwrap_or_else(|| unreachable!());
        assert!(coordinator.release_lease(&lease).await.is_ok());

        let third = coordinator.try_acquire_lease("7:42", "api-2", 30).await;
        assert!(matches!(third, Ok(Some(_))));
    }

    #[tokio::test]
    async fn release_with_foreign_token_keeps_lease() {
        let coordinator = InMemoryRotationLeaseCoordinator::new();

        let held = coordinator.try_acquire_lease("7:42", "api-1", 30).await;
        assert!(matches!(held, Ok(Some(_))));

        let foreign = RotationTickLease {
            scope_key: "7:42".to_owned(),
            token: "api-2:unknown".to_owned(),
            holder_id: "api-2".to_owned(),
        };
        assert!(coordinator.release_lease(&foreign).await.is_ok());

        let again = coordinator.try_acquire_lease("7:42", "api-2", 30).await;
        assert!(matches!(again, Ok(None)));
    }

    #[tokio::test]
    async fn zero_lease_seconds_is_rejected() {
        let coordinator = InMemoryRotationLeaseCoordinator::new();
        let result = coordinator.try_acquire_lease("7:42", "api-1", 0).await;
        assert!(result.is_err());
    }
}
