use std::collections::HashMap;

use async_trait::async_trait;
use qrotate_application::CompanyTokenRepository;
use qrotate_core::{AppError, AppResult};
use qrotate_domain::{CompanyToken, RotationKey};
use tokio::sync::RwLock;

/// In-memory company token store used for local development and tests.
#[derive(Default)]
pub struct InMemoryCompanyTokenRepository {
    tokens: RwLock<HashMap<RotationKey, CompanyToken>>,
}

impl InMemoryCompanyTokenRepository {
    /// Creates an empty token store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `business:company=token` entries separated by commas.
    pub fn from_entries(entries: &str) -> AppResult<Self> {
        let mut tokens = HashMap::new();

        for entry in entries.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let (scope, token) = entry.split_once('=').ok_or_else(|| {
                AppError::Validation(format!(
                    "company token entry '{entry}' must be formatted as business:company=token"
                ))
            })?;
            let (business_id, company_id) = scope.split_once(':').ok_or_else(|| {
                AppError::Validation(format!(
                    "company token entry '{entry}' must be formatted as business:company=token"
                ))
            })?;

            let key = RotationKey::new(business_id.trim(), company_id.trim())?;
            tokens.insert(key, CompanyToken::new(token.trim())?);
        }

        Ok(Self {
            tokens: RwLock::new(tokens),
        })
    }

    /// Sets the active token of one company.
    pub async fn insert_token(&self, key: RotationKey, token: CompanyToken) {
        self.tokens.write().await.insert(key, token);
    }

    /// Removes the active token of one company.
    pub async fn deactivate(&self, key: &RotationKey) {
        self.tokens.write().await.remove(key);
    }

    /// Returns the number of companies with an active token.
    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    /// Returns whether no company has an active token.
    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

#[async_trait]
impl CompanyTokenRepository for InMemoryCompanyTokenRepository {
    async fn find_active_token(&self, key: &RotationKey) -> AppResult<Option<CompanyToken>> {
        Ok(self.tokens.read().await.get(key).cloned())
    }
}
