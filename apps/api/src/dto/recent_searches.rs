use qrotate_application::RecentSearchChip;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Incoming payload for recording a search term.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/add-recent-search-request.ts"
)]
pub struct AddRecentSearchRequest {
    pub term: String,
}

/// One rendered recent-search chip.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/recent-search-chip-response.ts"
)]
pub struct RecentSearchChipResponse {
    #[ts(type = "number")]
    pub position: usize,
    pub label: String,
}

impl From<RecentSearchChip> for RecentSearchChipResponse {
    fn from(value: RecentSearchChip) -> Self {
        Self {
            position: value.position,
            label: value.label,
        }
    }
}

/// Term to re-issue after a chip was clicked.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/recent-search-selection-response.ts"
)]
pub struct RecentSearchSelectionResponse {
    pub term: String,
}
