//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_company_token_repository;
mod in_memory_recent_search_storage;
mod in_memory_rotation_lease_coordinator;
mod in_memory_rotation_state_repository;
mod in_process_rotation_broadcaster;
mod json_file_recent_search_storage;
mod postgres_company_token_repository;
mod redis_rotation_broadcaster;
mod redis_rotation_lease_coordinator;
mod redis_rotation_state_repository;
mod redis_rotation_tick_queue;
mod tokio_rotation_tick_scheduler;

pub use in_memory_company_token_repository::InMemoryCompanyTokenRepository;
pub use in_memory_recent_search_storage::InMemoryRecentSearchStorage;
pub use in_memory_rotation_lease_coordinator::InMemoryRotationLeaseCoordinator;
pub use in_memory_rotation_state_repository::InMemoryRotationStateRepository;
pub use in_process_rotation_broadcaster::{
    DEFAULT_BROADCAST_CAPACITY, InProcessRotationBroadcaster,
};
pub use json_file_recent_search_storage::JsonFileRecentSearchStorage;
pub use postgres_company_token_repository::PostgresCompanyTokenRepository;
pub use redis_rotation_broadcaster::RedisRotationBroadcaster;
pub use redis_rotation_lease_coordinator::RedisRotationLeaseCoordinator;
pub use redis_rotation_state_repository::RedisRotationStateRepository;
pub use redis_rotation_tick_queue::RedisRotationTickQueue;
pub use tokio_rotation_tick_scheduler::{
    TokioRotationTickRunner, TokioRotationTickScheduler, tokio_tick_channel,
};
