//! HTTP surface.
//!
//! Endpoints:
//! - `POST /api/orders/execute` — accept a market order, respond `202`
//! - `GET /api/orders/execute?orderId=` — WebSocket upgrade for status updates
//! - `GET /api/orders/history?limit&cursor` — cursor-paginated history
//! - `GET /health` — liveness and venue listing
//!
//! Every response carries an `x-request-id` header; unknown routes get a
//! JSON `404`.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat};
use history::{clamp_limit, HistoryStore};
use hub::StatusHub;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::error;

use crate::error::ApiError;
use crate::intake::{Intake, RawOrderRequest};
use crate::ws::ws_handler;

/// Shared application state.
pub struct AppState {
    pub intake: Intake,
    pub history: Arc<dyn HistoryStore>,
    pub hub: Arc<StatusHub>,
    pub venues: Vec<&'static str>,
}

/// Build the service router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/orders/execute",
            post(execute_handler).get(ws_handler),
        )
        .route("/api/orders/history", get(history_handler))
        .route("/health", get(health_handler))
        .fallback(not_found_handler)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// POST /api/orders/execute
async fn execute_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RawOrderRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(raw)) = body else {
        return ApiError::Validation(vec!["request body must be a JSON object".to_string()])
            .into_response();
    };
    match state.intake.submit(raw).await {
        Ok(job) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "orderId": job.order_id,
                "status": "pending",
            })),
        )
            .into_response(),
        Err(err) => {
            if let ApiError::Internal(message) = &err {
                error!(%message, "order intake failed");
            }
            err.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<u32>,
    cursor: Option<String>,
}

/// GET /api/orders/history
async fn history_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Response {
    let limit = clamp_limit(params.limit.unwrap_or(50));
    let cursor = match params.cursor.as_deref() {
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(parsed) => Some(parsed.to_utc()),
            Err(_) => {
                return ApiError::Validation(vec![
                    "cursor must be an ISO-8601 timestamp".to_string()
                ])
                .into_response();
            }
        },
        None => None,
    };

    match state.history.list(limit, cursor).await {
        Ok(page) => {
            // `Z` suffix keeps the cursor safe inside a query string
            // (a `+00:00` offset would decode as a space).
            let next_cursor = page
                .next_cursor
                .map(|c| c.to_rfc3339_opts(SecondsFormat::Nanos, true));
            Json(serde_json::json!({
                "data": page.rows,
                "pagination": {
                    "limit": limit,
                    "nextCursor": next_cursor,
                    "hasMore": page.next_cursor.is_some(),
                },
            }))
            .into_response()
        }
        Err(err) => {
            error!(%err, "history query failed");
            ApiError::Internal("failed to load order history".to_string()).into_response()
        }
    }
}

/// GET /health
async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(serde_json::json!({
        "status": "ok",
        "venues": state.venues,
        "subscribers": state.hub.subscriber_count(),
    }))
    .into_response()
}

async fn not_found_handler() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "message": "Route not found" })),
    )
        .into_response()
}
