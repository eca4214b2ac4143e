use async_trait::async_trait;
use qrotate_core::AppResult;
use qrotate_domain::{CompanyToken, RotationKey};

/// Lookup port for the long-lived company secret.
#[async_trait]
pub trait CompanyTokenRepository: Send + Sync {
    /// Returns the active token of the company, or `None` when none is active.
    async fn find_active_token(&self, key: &RotationKey) -> AppResult<Option<CompanyToken>>;
}
