mod health;
mod qr;
mod recent_searches;

pub use health::{HealthDependencyStatus, HealthResponse};
pub use qr::{
    ConnectionEstablishedEvent, QrEventsQuery, QrTokenRotatedEvent, RotationStatusResponse,
    StartRotationRequest,
};
pub use recent_searches::{
    AddRecentSearchRequest, RecentSearchChipResponse, RecentSearchSelectionResponse,
};
