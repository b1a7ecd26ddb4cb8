use std::sync::Arc;
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};
use tracing::info;

use shared_models::error::AppError;

use crate::models::{CalendarAccess, CalendarError, ImportEventsQuery};
use crate::router::CalendarState;

pub const USER_TOKEN_HEADER: &str = "X-Google-Access-Token";

/// Raw events for client-side curation before an import. Nothing is written.
#[axum::debug_handler]
pub async fn get_events_for_import(
    State(state): State<Arc<CalendarState>>,
    headers: HeaderMap,
    Query(query): Query<ImportEventsQuery>,
) -> Result<Json<Value>, AppError> {
    let access = if query.use_user_token {
        let token = headers
            .get(USER_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::BadRequest(format!("{} header is required", USER_TOKEN_HEADER)))?;
        CalendarAccess::UserToken(token.to_string())
    } else {
        CalendarAccess::ServiceAccount
    };

    let time_min = query
        .start
        .and_hms_opt(0, 0, 0)
        .map(|d| d.and_utc())
        .ok_or_else(|| AppError::BadRequest("Invalid start date".to_string()))?;
    // End date is inclusive for callers
    let time_max = query
        .end
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .ok_or_else(|| AppError::BadRequest("Invalid end date".to_string()))?;

    let events = state
        .client
        .list_events(&query.calendar_id, time_min, time_max, &access)
        .await
        .map_err(|e| calendar_error_to_app("Failed to fetch calendar events", e))?;

    info!("Returning {} events from {} for import", events.len(), query.calendar_id);

    Ok(Json(json!({
        "events": events,
        "total": events.len()
    })))
}

pub fn calendar_error_to_app(context: &str, err: CalendarError) -> AppError {
    match err {
        CalendarError::ValidationError(msg) => AppError::ValidationError(msg),
        CalendarError::NotConfigured => AppError::Internal(err.to_string()),
        other => AppError::UpstreamUnavailable {
            message: context.to_string(),
            details: other.to_string(),
        },
    }
}
