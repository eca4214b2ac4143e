use std::sync::Arc;

use qrotate_application::{RecentSearchService, RotationEventSource, RotationService};
use sqlx::PgPool;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub rotation_service: RotationService,
    pub event_source: Arc<dyn RotationEventSource>,
    pub recent_search_service: RecentSearchService,
    pub redis_client: Option<redis::Client>,
    pub postgres_pool: Option<PgPool>,
    pub frontend_url: String,
}
