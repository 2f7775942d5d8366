//! HTTP surface: cached order reads, publishing and health checks.

pub mod error;
mod middleware;
mod orders;

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use sqlx::Error as SqlxError;

use crate::{
    application::{error::ErrorReport, ingest::OrderPublisher, repos::OrdersRepo},
    cache::OrderCache,
    infra::db::PostgresRepositories,
};

pub use error::ApiError;
pub use middleware::RequestContext;

#[derive(Clone)]
pub struct HttpState {
    pub cache: Arc<OrderCache>,
    pub repo: Arc<dyn OrdersRepo>,
    pub publisher: Arc<dyn OrderPublisher>,
    /// Absent when running against the in-memory store.
    pub db: Option<PostgresRepositories>,
    pub store_timeout: Duration,
}

pub fn build_router(state: HttpState) -> Router {
    let body_limit = state.publisher.max_payload_bytes();

    Router::new()
        .route("/api/v1/orders", post(orders::publish_order))
        .route("/api/v1/orders/{uid}", get(orders::get_order))
        .route("/_health/db", get(orders::db_health))
        .route("/_health/cache", get(orders::cache_health))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
