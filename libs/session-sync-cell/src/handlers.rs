// libs/session-sync-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{
    CreateWatchRequest, ImportEventsRequest, ImportPatientRequest, SessionRangeQuery,
    UpdateSessionStatusRequest, WebhookNotification, WebhookOutcome,
};
use crate::router::SyncState;

pub const CHANNEL_ID_HEADER: &str = "X-Goog-Channel-ID";
pub const RESOURCE_ID_HEADER: &str = "X-Goog-Resource-ID";
pub const RESOURCE_STATE_HEADER: &str = "X-Goog-Resource-State";
pub const MESSAGE_NUMBER_HEADER: &str = "X-Goog-Message-Number";

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// ==============================================================================
// WEBHOOK
// ==============================================================================

/// Google Calendar push endpoint. Acknowledges immediately and reconciles in
/// the background; failures are only logged.
pub async fn receive_webhook(
    State(state): State<Arc<SyncState>>,
    headers: HeaderMap,
) -> (StatusCode, &'static str) {
    let (Some(channel_id), Some(resource_state)) = (
        header_value(&headers, CHANNEL_ID_HEADER),
        header_value(&headers, RESOURCE_STATE_HEADER),
    ) else {
        warn!("Webhook without channel id or resource state headers");
        return (StatusCode::OK, "OK");
    };

    let notification = WebhookNotification {
        channel_id,
        resource_id: header_value(&headers, RESOURCE_ID_HEADER),
        resource_state,
        message_number: header_value(&headers, MESSAGE_NUMBER_HEADER),
    };

    info!(
        "Webhook received: channel={} state={} message={:?}",
        notification.channel_id, notification.resource_state, notification.message_number
    );

    let sync = state.sync.clone();
    tokio::spawn(async move {
        match sync.handle_notification(&notification).await {
            Ok(WebhookOutcome::Processed(processing)) => match processing.result.error {
                Some(reason) => warn!(
                    "Channel {} event {} not reconciled: {}",
                    notification.channel_id, processing.event_id, reason
                ),
                None => info!(
                    "Channel {} event {} reconciled: {:?}",
                    notification.channel_id, processing.event_id, processing.outcome
                ),
            },
            Ok(WebhookOutcome::Ignored { reason }) => {
                info!("Channel {} notification ignored: {}", notification.channel_id, reason)
            }
            Err(e) => error!(
                "Webhook processing failed for channel {}: {}",
                notification.channel_id, e
            ),
        }
    });

    (StatusCode::OK, "OK")
}

// ==============================================================================
// IMPORT
// ==============================================================================

#[axum::debug_handler]
pub async fn import_patient(
    State(state): State<Arc<SyncState>>,
    Json(request): Json<ImportPatientRequest>,
) -> Result<Json<Value>, AppError> {
    let response = state.import.import_patient(request).await?;

    Ok(Json(json!({
        "patient_id": response.patient_id,
        "session_ids": response.session_ids,
        "total_sessions": response.session_ids.len()
    })))
}

#[axum::debug_handler]
pub async fn import_events(
    State(state): State<Arc<SyncState>>,
    Json(request): Json<ImportEventsRequest>,
) -> Result<Json<Value>, AppError> {
    let response = state.import.import_events(request).await?;
    let total_sessions: usize = response.patients.iter().map(|p| p.session_ids.len()).sum();

    Ok(Json(json!({
        "patients": response.patients,
        "skipped": response.skipped,
        "total_sessions": total_sessions
    })))
}

// ==============================================================================
// SESSIONS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_sessions(
    State(state): State<Arc<SyncState>>,
    Query(query): Query<SessionRangeQuery>,
) -> Result<Json<Value>, AppError> {
    let sessions = state
        .sessions
        .list_sessions(query.therapist_id, query.start, query.end)
        .await?;

    Ok(Json(json!({
        "sessions": sessions,
        "total": sessions.len()
    })))
}

#[axum::debug_handler]
pub async fn list_calendar_only_events(
    State(state): State<Arc<SyncState>>,
    Query(query): Query<SessionRangeQuery>,
) -> Result<Json<Value>, AppError> {
    let events = state
        .sync
        .calendar_only_events(query.therapist_id, query.start, query.end)
        .await?;

    Ok(Json(json!({
        "events": events,
        "total": events.len()
    })))
}

#[axum::debug_handler]
pub async fn update_session_status(
    State(state): State<Arc<SyncState>>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<UpdateSessionStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let session = state.sessions.update_status(session_id, request.status).await?;
    Ok(Json(json!(session)))
}

// ==============================================================================
// WATCH CHANNELS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_watch(
    State(state): State<Arc<SyncState>>,
    Json(request): Json<CreateWatchRequest>,
) -> Result<Json<Value>, AppError> {
    let channel = state.sync.create_watch(request.therapist_id).await?;
    Ok(Json(json!(channel)))
}

#[axum::debug_handler]
pub async fn stop_watch(
    State(state): State<Arc<SyncState>>,
    Path(channel_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    state.sync.stop_watch(&channel_id).await?;
    Ok(Json(json!({
        "stopped": true,
        "channel_id": channel_id
    })))
}
