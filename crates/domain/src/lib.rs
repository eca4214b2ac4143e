//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod recent_search;
mod rotation;
mod token;

pub use recent_search::{RECENT_SEARCH_CAPACITY, RecentSearches};
pub use rotation::{
    DEFAULT_INTERVAL_SECONDS, DEFAULT_LAST_SCAN_TTL_SECONDS, DEFAULT_MAX_INTERVAL_SECONDS,
    DEFAULT_STALENESS_THRESHOLD_SECONDS, DEFAULT_TICK_LEASE_SECONDS, RotationKey, RotationPhase,
    RotationSettings, RotationState,
};
pub use token::{
    CompanyToken, CompositeToken, SESSION_TOKEN_ALPHABET, SESSION_TOKEN_LENGTH, SessionToken,
};
