//! Application services and ports.

#![forbid(unsafe_code)]

mod recent_search_service;
mod rotation_ports;
mod rotation_service;
mod session_token;

pub use recent_search_service::{
    RECENT_SEARCH_STORAGE_KEY, RecentSearchChip, RecentSearchService, RecentSearchStorage,
};
pub use rotation_ports::{
    CompanyTokenRepository, QR_TOKEN_ROTATED_EVENT, QrTokenRotated, RotationBroadcast,
    RotationBroadcaster, RotationClock, RotationEventSource, RotationLeaseCoordinator,
    RotationStateRepository, RotationStatus, RotationSubscription, RotationTickJob,
    RotationTickLease, RotationTickScheduler, StartRotationInput, StopReason,
    SystemRotationClock, TickOutcome,
};
pub use rotation_service::RotationService;
pub use session_token::generate_session_token;
