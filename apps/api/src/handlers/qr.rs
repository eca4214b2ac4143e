use std::convert::Infallible;
use std::future::ready;
use std::time::Duration;

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::response::Sse;
use axum::response::sse::{Event, KeepAlive};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use qrotate_application::{RotationSubscription, StartRotationInput};
use qrotate_core::{AppError, ConnectionId};
use qrotate_domain::RotationKey;
use tracing::{debug, warn};

use crate::dto::{
    ConnectionEstablishedEvent, QrEventsQuery, QrTokenRotatedEvent, RotationStatusResponse,
    StartRotationRequest,
};
use crate::error::ApiResult;
use crate::middleware::RequestConnection;
use crate::state::AppState;

/// SSE event announcing the connection id of a new stream.
pub const CONNECTION_ESTABLISHED_EVENT: &str = "connection.established";

pub async fn start_rotation_handler(
    State(state): State<AppState>,
    Path((business_id, company_id)): Path<(String, String)>,
    Extension(RequestConnection(origin)): Extension<RequestConnection>,
    Json(payload): Json<StartRotationRequest>,
) -> ApiResult<Json<RotationStatusResponse>> {
    let key = RotationKey::new(business_id, company_id)?;
    let status = state
        .rotation_service
        .start_rotation(
            key,
            StartRotationInput {
                interval_seconds: payload.interval_seconds,
                origin,
            },
        )
        .await?;

    Ok(Json(RotationStatusResponse::from(status)))
}

pub async fn heartbeat_handler(
    State(state): State<AppState>,
    Path((business_id, company_id)): Path<(String, String)>,
) -> ApiResult<Json<RotationStatusResponse>> {
    let key = RotationKey::new(business_id, company_id)?;
    let status = state.rotation_service.heartbeat(&key).await?;

    Ok(Json(RotationStatusResponse::from(status)))
}

pub async fn stop_rotation_handler(
    State(state): State<AppState>,
    Path((business_id, company_id)): Path<(String, String)>,
) -> ApiResult<Json<RotationStatusResponse>> {
    let key = RotationKey::new(business_id, company_id)?;
    let status = state.rotation_service.stop_rotation(&key).await?;

    Ok(Json(RotationStatusResponse::from(status)))
}

pub async fn rotation_status_handler(
    State(state): State<AppState>,
    Path((business_id, company_id)): Path<(String, String)>,
) -> ApiResult<Json<RotationStatusResponse>> {
    let key = RotationKey::new(business_id, company_id)?;
    let status = state.rotation_service.rotation_status(&key).await?;

    Ok(Json(RotationStatusResponse::from(status)))
}

pub async fn rotation_events_handler(
    State(state): State<AppState>,
    Path((business_id, company_id)): Path<(String, String)>,
    Query(query): Query<QrEventsQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let key = RotationKey::new(business_id, company_id)?;
    let socket_id = match query.socket_id.filter(|value| !value.trim().is_empty()) {
        Some(socket_id) => ConnectionId::new(socket_id)?,
        None => ConnectionId::new(uuid::Uuid::new_v4().to_string())?,
    };

    let subscription = state.event_source.subscribe(&key).await?;
    debug!(
        business_id = %key.business_id(),
        company_id = %key.company_id(),
        socket_id = %socket_id,
        "rotation event stream opened"
    );

    let established = Event::default()
        .event(CONNECTION_ESTABLISHED_EVENT)
        .json_data(ConnectionEstablishedEvent {
            socket_id: socket_id.as_str().to_owned(),
        })
        .map_err(|error| {
            AppError::Internal(format!("failed to encode connection event: {error}"))
        })?;

    let rotations = visible_rotations(subscription, socket_id).filter_map(|(event, payload)| {
        ready(
            Event::default()
                .event(event)
                .json_data(payload)
                .map_err(|error| warn!(error = %error, "failed to encode rotation event"))
                .ok()
                .map(Ok::<Event, Infallible>),
        )
    });

    let stream = stream::once(ready(Ok::<Event, Infallible>(established))).chain(rotations);
    Ok(Sse::new(stream).keep_alive(default_keep_alive()))
}

/// Broadcasts for one subscriber, without the ones it originated.
pub fn visible_rotations(
    subscription: RotationSubscription,
    socket_id: ConnectionId,
) -> BoxStream<'static, (String, QrTokenRotatedEvent)> {
    subscription
        .filter_map(move |broadcast| {
            let visible = broadcast.is_visible_to(Some(&socket_id));
            ready(
                visible
                    .then(|| (broadcast.event, QrTokenRotatedEvent::from(broadcast.payload))),
            )
        })
        .boxed()
}

fn default_keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(15))
        .text("keep-alive")
}
