use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::{application::ingest::PublishError, cache::OrderLookup, domain::order::OrderUid};

use super::{HttpState, error::ApiError};

#[derive(Debug, Serialize)]
pub struct AcceptedBody {
    pub message_id: u64,
}

#[derive(Debug, Serialize)]
pub struct CacheHealthBody {
    pub entries: usize,
    pub capacity: usize,
}

/// Serve an order from the cache only; a miss is a 404.
pub async fn get_order(
    State(state): State<HttpState>,
    Path(uid): Path<String>,
) -> Result<Response, ApiError> {
    let uid = OrderUid::from(uid);
    if uid.is_blank() {
        return Err(ApiError::bad_request("Order uid must not be blank", None));
    }

    let Some(order) = state.cache.get(&uid) else {
        return Err(ApiError::not_found(
            "Order not found",
            Some(format!("no cached order with uid `{uid}`")),
        ));
    };

    match timeout(state.store_timeout, state.repo.touch(&uid)).await {
        Ok(Ok(())) => debug!(order_uid = %uid, "Touched order recency"),
        Ok(Err(err)) => warn!(order_uid = %uid, error = %err, "Failed to touch order recency"),
        Err(_) => warn!(order_uid = %uid, "Timed out touching order recency"),
    }

    Ok(Json(order.as_ref()).into_response())
}

/// Enqueue a raw order payload on the stream; processing happens asynchronously.
pub async fn publish_order(
    State(state): State<HttpState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request("Request body must not be empty", None));
    }

    let message_id = state.publisher.publish(body).await.map_err(|err| match err {
        PublishError::TooLarge { .. } => ApiError::payload_too_large(err.to_string()),
        PublishError::Closed => ApiError::stream_closed(None),
        PublishError::Transport(_) => ApiError::stream_closed(Some(err.to_string())),
    })?;

    Ok((StatusCode::ACCEPTED, Json(AcceptedBody { message_id })).into_response())
}

pub async fn db_health(State(state): State<HttpState>) -> Response {
    match state.db.as_ref() {
        Some(db) => super::db_health_response(db.health_check().await),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

pub async fn cache_health(State(state): State<HttpState>) -> Json<CacheHealthBody> {
    Json(CacheHealthBody {
        entries: state.cache.len(),
        capacity: state.cache.capacity(),
    })
}
