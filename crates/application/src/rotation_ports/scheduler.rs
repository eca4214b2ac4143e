use std::time::Duration;

use async_trait::async_trait;
use qrotate_core::AppResult;

use super::tick::RotationTickJob;

/// Deferred task queue port used to re-enter the rotation loop.
#[async_trait]
pub trait RotationTickScheduler: Send + Sync {
    /// Enqueues one tick to run after the given delay.
    async fn schedule_tick(&self, job: RotationTickJob, delay: Duration) -> AppResult<()>;
}
