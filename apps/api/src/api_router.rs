mod cors;

use axum::Router;
use axum::middleware::from_fn;
use axum::routing::{get, post};
use qrotate_core::AppError;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{handlers, middleware};

const QR_ROUTE_PREFIX: &str = "/api/businesses/{business_id}/companies/{company_id}/qr";

pub fn build_router(app_state: AppState, frontend_url: &str) -> Result<Router, AppError> {
    let qr_routes = Router::new()
        .route(
            format!("{QR_ROUTE_PREFIX}/start").as_str(),
            post(handlers::qr::start_rotation_handler),
        )
        .route(
            format!("{QR_ROUTE_PREFIX}/heartbeat").as_str(),
            post(handlers::qr::heartbeat_handler),
        )
        .route(
            format!("{QR_ROUTE_PREFIX}/stop").as_str(),
            post(handlers::qr::stop_rotation_handler),
        )
        .route(
            format!("{QR_ROUTE_PREFIX}/status").as_str(),
            get(handlers::qr::rotation_status_handler),
        )
        .route(
            format!("{QR_ROUTE_PREFIX}/events").as_str(),
            get(handlers::qr::rotation_events_handler),
        )
        .route_layer(from_fn(middleware::extract_socket_id));

    let recent_search_routes = Router::new()
        .route(
            "/api/recent-searches",
            get(handlers::recent_searches::list_recent_searches_handler)
                .post(handlers::recent_searches::add_recent_search_handler)
                .delete(handlers::recent_searches::clear_recent_searches_handler),
        )
        .route(
            "/api/recent-searches/{position}",
            get(handlers::recent_searches::select_recent_search_handler),
        );

    Ok(Router::new()
        .route("/health", get(handlers::health::health_handler))
        .merge(qr_routes)
        .merge(recent_search_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors::build_cors_layer(frontend_url)?)
        .with_state(app_state))
}
