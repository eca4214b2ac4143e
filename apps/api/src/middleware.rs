use axum::extract::Request;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use qrotate_core::{AppError, ConnectionId};

use crate::error::ApiResult;

/// Header naming the realtime connection of the caller.
pub const SOCKET_ID_HEADER: &str = "x-socket-id";

/// Realtime connection of the current request, if the caller sent one.
#[derive(Debug, Clone, Default)]
pub struct RequestConnection(pub Option<ConnectionId>);

pub async fn extract_socket_id(mut request: Request, next: Next) -> ApiResult<Response> {
    let connection = socket_id_from_headers(request.headers())?;
    request
        .extensions_mut()
        .insert(RequestConnection(connection));
    Ok(next.run(request).await)
}

pub fn socket_id_from_headers(headers: &HeaderMap) -> Result<Option<ConnectionId>, AppError> {
    let Some(value) = headers.get(SOCKET_ID_HEADER) else {
        return Ok(None);
    };

    let value = value.to_str().map_err(|_| {
        AppError::Validation(format!("{SOCKET_ID_HEADER} header must be visible ASCII"))
    })?;

    if value.trim().is_empty() {
        return Ok(None);
    }

    ConnectionId::new(value).map(Some)
}
