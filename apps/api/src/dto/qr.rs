use qrotate_application::{QrTokenRotated, RotationStatus};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Incoming payload for starting or keeping alive a rotation loop.
#[derive(Debug, Default, Deserialize, TS)]
#[serde(default)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/start-rotation-request.ts"
)]
pub struct StartRotationRequest {
    pub interval_seconds: Option<u32>,
}

/// Query parameters of the rotation event stream.
#[derive(Debug, Default, Deserialize)]
pub struct QrEventsQuery {
    pub socket_id: Option<String>,
}

/// API representation of one rotation loop.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/rotation-status-response.ts"
)]
pub struct RotationStatusResponse {
    pub business_id: String,
    pub company_id: String,
    pub phase: String,
    pub active: bool,
    pub last_scan_at: Option<String>,
    #[ts(type = "number")]
    pub staleness_seconds: i64,
    pub interval_seconds: u32,
    pub last_tick_at: Option<String>,
}

impl From<RotationStatus> for RotationStatusResponse {
    fn from(value: RotationStatus) -> Self {
        Self {
            business_id: value.key.business_id().to_owned(),
            company_id: value.key.company_id().to_owned(),
            phase: value.phase.as_str().to_owned(),
            active: value.active,
            last_scan_at: value.last_scan_at.map(|at| at.to_rfc3339()),
            staleness_seconds: value.staleness_seconds,
            interval_seconds: value.interval_seconds,
            last_tick_at: value.last_tick_at.map(|at| at.to_rfc3339()),
        }
    }
}

/// Server-sent `qr.token.rotated` event data.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/qr-token-rotated-event.ts"
)]
pub struct QrTokenRotatedEvent {
    pub token: String,
    pub company_id: String,
    pub business_id: String,
}

impl From<QrTokenRotated> for QrTokenRotatedEvent {
    fn from(value: QrTokenRotated) -> Self {
        Self {
            token: value.token,
            company_id: value.company_id,
            business_id: value.business_id,
        }
    }
}

/// First event of every stream, carrying the id to send as `x-socket-id`.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/connection-established-event.ts"
)]
pub struct ConnectionEstablishedEvent {
    pub socket_id: String,
}
