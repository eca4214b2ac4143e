mod broadcast;
mod clock;
mod lease;
mod scheduler;
mod state;
mod tick;
mod token_source;

pub use broadcast::{
    QR_TOKEN_ROTATED_EVENT, QrTokenRotated, RotationBroadcast, RotationBroadcaster,
    RotationEventSource, RotationSubscription,
};
pub use clock::{RotationClock, SystemRotationClock};
pub use lease::{RotationLeaseCoordinator, RotationTickLease};
pub use scheduler::RotationTickScheduler;
pub use state::RotationStateRepository;
pub use tick::{RotationStatus, RotationTickJob, StartRotationInput, StopReason, TickOutcome};
pub use token_source::CompanyTokenRepository;
