use async_trait::async_trait;
use sqlx::PgPool;

use qrotate_application::CompanyTokenRepository;
use qrotate_core::{AppError, AppResult};
use qrotate_domain::{CompanyToken, RotationKey};

/// PostgreSQL-backed lookup of active company tokens.
#[derive(Clone)]
pub struct PostgresCompanyTokenRepository {
    pool: PgPool,
}

impl PostgresCompanyTokenRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CompanyTokenRepository for PostgresCompanyTokenRepository {
    async fn find_active_token(&self, key: &RotationKey) -> AppResult<Option<CompanyToken>> {
        let token = sqlx::query_scalar::<_, String>(
            r#"
            SELECT token
            FROM company_tokens
            WHERE business_id = $1
              AND company_id = $2
              AND is_active
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(key.business_id())
        .bind(key.company_id())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to find active company token for '{key}': {error}"
            ))
        })?;

        token.map(CompanyToken::new).transpose()
    }
}
