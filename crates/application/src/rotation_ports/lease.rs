use async_trait::async_trait;
use qrotate_core::AppResult;

/// Ownership proof for one acquired tick lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationTickLease {
    /// Lease scope, one per rotation key.
    pub scope_key: String,
    /// Unique token compared on release.
    pub token: String,
    /// Worker that holds the lease.
    pub holder_id: String,
}

/// Distributed mutual exclusion port for rotation ticks.
#[async_trait]
pub trait RotationLeaseCoordinator: Send + Sync {
    /// Attempts to acquire one lease for the given scope.
    async fn try_acquire_lease(
        &self,
        scope_key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<RotationTickLease>>;

    /// Releases one lease using token compare-and-delete semantics.
    async fn release_lease(&self, lease: &RotationTickLease) -> AppResult<()>;
}
