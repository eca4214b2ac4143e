use std::sync::Arc;

use qrotate_application::{
    CompanyTokenRepository, RecentSearchService, RecentSearchStorage, RotationEventSource,
    RotationService,
};
use qrotate_core::AppError;
use qrotate_domain::RotationSettings;
use qrotate_infrastructure::{
    InMemoryCompanyTokenRepository, InMemoryRecentSearchStorage,
    InMemoryRotationLeaseCoordinator, InMemoryRotationStateRepository,
    InProcessRotationBroadcaster, JsonFileRecentSearchStorage, PostgresCompanyTokenRepository,
    RedisRotationBroadcaster, RedisRotationLeaseCoordinator, RedisRotationStateRepository,
    RedisRotationTickQueue, TokioRotationTickRunner, tokio_tick_channel,
};
use tracing::{info, warn};

use crate::api_config::ApiConfig;
use crate::state::AppState;

use super::{build_redis_client, connect_and_migrate};

/// Composed application state plus the in-process tick runner, when one is needed.
pub struct BuiltAppState {
    pub app_state: AppState,
    pub tick_runner: Option<TokioRotationTickRunner>,
}

/// Rotation stack living entirely inside this process.
pub struct InMemoryRotation {
    pub rotation_service: RotationService,
    pub event_source: Arc<dyn RotationEventSource>,
    pub tick_runner: TokioRotationTickRunner,
}

pub async fn build_app_state(config: &ApiConfig) -> Result<BuiltAppState, AppError> {
    let redis_client = config
        .redis_url
        .as_deref()
        .map(build_redis_client)
        .transpose()?;

    let postgres_pool = match config.database_url.as_deref() {
        Some(database_url) => Some(connect_and_migrate(database_url).await?),
        None => None,
    };

    let token_repository: Arc<dyn CompanyTokenRepository> = match postgres_pool.clone() {
        Some(pool) => Arc::new(PostgresCompanyTokenRepository::new(pool)),
        None => {
            let repository =
                InMemoryCompanyTokenRepository::from_entries(config.dev_company_tokens.as_str())?;
            if repository.is_empty().await {
                warn!(
                    "no company tokens configured; rotation loops stop on their first tick \
                     until DATABASE_URL or DEV_COMPANY_TOKENS is set"
                );
            }
            Arc::new(repository)
        }
    };

    let (rotation_service, event_source, tick_runner) = match redis_client.clone() {
        Some(client) => {
            let prefix = config.redis_key_prefix.as_str();
            let broadcaster = Arc::new(RedisRotationBroadcaster::new(client.clone(), prefix));
            let rotation_service = RotationService::new(
                Arc::new(RedisRotationStateRepository::new(client.clone(), prefix)),
                Arc::new(RedisRotationLeaseCoordinator::new(client.clone(), prefix)),
                token_repository,
                broadcaster.clone(),
                Arc::new(RedisRotationTickQueue::new(client, prefix)),
                config.rotation_settings,
            )
            .with_holder_id(config.instance_id.as_str());

            info!(key_prefix = %prefix, "rotation loops are queued in redis for qrotate-worker");
            (
                rotation_service,
                broadcaster as Arc<dyn RotationEventSource>,
                None,
            )
        }
        None => {
            let rotation = build_in_memory_rotation(token_repository, config.rotation_settings);
            info!("rotation loops run in-process; set REDIS_URL to share them with qrotate-worker");
            (
                rotation
                    .rotation_service
                    .with_holder_id(config.instance_id.as_str()),
                rotation.event_source,
                Some(rotation.tick_runner),
            )
        }
    };

    let recent_search_storage: Arc<dyn RecentSearchStorage> =
        match config.recent_search_file.clone() {
            Some(path) => Arc::new(JsonFileRecentSearchStorage::new(path)),
            None => Arc::new(InMemoryRecentSearchStorage::new()),
        };

    Ok(BuiltAppState {
        app_state: AppState {
            rotation_service,
            event_source,
            recent_search_service: RecentSearchService::new(recent_search_storage),
            redis_client,
            postgres_pool,
            frontend_url: config.frontend_url.clone(),
        },
        tick_runner,
    })
}

pub fn build_in_memory_rotation(
    token_repository: Arc<dyn CompanyTokenRepository>,
    settings: RotationSettings,
) -> InMemoryRotation {
    let broadcaster = Arc::new(InProcessRotationBroadcaster::default());
    let (scheduler, tick_runner) = tokio_tick_channel();

    let rotation_service = RotationService::new(
        Arc::new(InMemoryRotationStateRepository::new()),
        Arc::new(InMemoryRotationLeaseCoordinator::new()),
        token_repository,
        broadcaster.clone(),
        Arc::new(scheduler),
        settings,
    );

    InMemoryRotation {
        rotation_service,
        event_source: broadcaster,
        tick_runner,
    }
}
