use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::dto::{
    AddRecentSearchRequest, RecentSearchChipResponse, RecentSearchSelectionResponse,
};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_recent_searches_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<RecentSearchChipResponse>>> {
    let chips = state.recent_search_service.render().await?;
    Ok(Json(
        chips
            .into_iter()
            .map(RecentSearchChipResponse::from)
            .collect(),
    ))
}

pub async fn add_recent_search_handler(
    State(state): State<AppState>,
    Json(payload): Json<AddRecentSearchRequest>,
) -> ApiResult<Json<Vec<RecentSearchChipResponse>>> {
    let chips = state
        .recent_search_service
        .add_recent(payload.term.as_str())
        .await?;
    Ok(Json(
        chips
            .into_iter()
            .map(RecentSearchChipResponse::from)
            .collect(),
    ))
}

pub async fn clear_recent_searches_handler(State(state): State<AppState>) -> ApiResult<StatusCode> {
    state.recent_search_service.clear_recent().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn select_recent_search_handler(
    State(state): State<AppState>,
    Path(position): Path<usize>,
) -> ApiResult<Json<RecentSearchSelectionResponse>> {
    let term = state.recent_search_service.select(position).await?;
    Ok(Json(RecentSearchSelectionResponse { term }))
}
