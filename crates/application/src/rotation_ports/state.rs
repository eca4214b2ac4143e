use async_trait::async_trait;
use qrotate_core::AppResult;
use qrotate_domain::{RotationKey, RotationState};

/// Shared cache port holding one liveness record per rotation key.
#[async_trait]
pub trait RotationStateRepository: Send + Sync {
    /// Returns the stored record, if any.
    async fn find_state(&self, key: &RotationKey) -> AppResult<Option<RotationState>>;

    /// Replaces the record with `next`, or deletes it when `next` is `None`,
    /// only while the stored revision equals `expected_revision`.
    ///
    /// `expected_revision == None` expects no record. A zero ttl deletes the
    /// record. Returns whether the write was applied.
    async fn compare_and_swap_state(
        &self,
        key: &RotationKey,
        expected_revision: Option<u64>,
        next: Option<&RotationState>,
        ttl_seconds: u32,
    ) -> AppResult<bool>;

    /// Deletes the stored record unconditionally.
    async fn clear_state(&self, key: &RotationKey) -> AppResult<()>;
}
