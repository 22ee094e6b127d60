//! Log Routes
//!
//! - GET /api/logs - List all entries
//! - GET /api/logs/filter - Entries in a day window, optionally by name
//! - POST /api/logs - Create an entry
//! - DELETE /api/logs/:id - Delete an entry

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::api::dto::{
    FilteredLogsResponse, LogFilterQuery, LogListResponse, LogResponse, MessageResponse,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::events::UNKNOWN_NAME;
use crate::store::{LogFilter, LogPeriod, NewLogEntry};

/// GET /api/logs
pub async fn list_logs(State(state): State<Arc<AppState>>) -> ApiResult<Json<LogListResponse>> {
    let data = state.store.list().await?;
    Ok(Json(LogListResponse { data }))
}

/// GET /api/logs/filter
///
/// Days are taken in the site's local time.
pub async fn filter_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogFilterQuery>,
) -> ApiResult<Json<FilteredLogsResponse>> {
    let period = LogPeriod::from_query(
        query.period.as_deref(),
        query.date.as_deref(),
        query.start.as_deref(),
        query.end.as_deref(),
    )?;

    let filter = LogFilter {
        window: period.window(state.store.today()),
        name: query.name.filter(|n| !n.is_empty()),
    };

    let data = state.store.filter(&filter).await?;
    let unknown_visitors = data.iter().filter(|e| e.name == UNKNOWN_NAME).count();

    Ok(Json(FilteredLogsResponse {
        count: data.len(),
        unknown_visitors,
        data,
    }))
}

/// POST /api/logs
///
/// Malformed bodies and missing fields are rejected as 400 with the usual
/// `{"error": ...}` body.
pub async fn create_log(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewLogEntry>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<LogResponse>)> {
    let Json(entry) = payload?;
    let data = state.store.create(entry).await?;

    tracing::info!(log_id = data.id, name = %data.name, "Log created");

    Ok((StatusCode::CREATED, Json(LogResponse { data })))
}

/// DELETE /api/logs/:id
pub async fn delete_log(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let id: i64 = id
        .parse()
        .map_err(|_| ApiError::Validation("Invalid ID".to_string()))?;

    if !state.store.delete(id).await? {
        return Err(ApiError::NotFound("Log not found".to_string()));
    }

    tracing::info!(log_id = id, "Log deleted");

    Ok(Json(MessageResponse {
        message: "Log deleted successfully".to_string(),
    }))
}
