// libs/session-sync-cell/src/services/sessions.rs
use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use tracing::{info, instrument};
use uuid::Uuid;

use shared_utils::Clock;

use crate::error::SyncError;
use crate::models::{Session, SessionStatus, SessionView};
use crate::services::lifecycle::SessionLifecycleService;
use crate::services::store::SessionStore;

/// `[start 00:00 UTC, day after end 00:00 UTC)` for an inclusive date range.
pub(crate) fn day_range(start: NaiveDate, end: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>), SyncError> {
    if end < start {
        return Err(SyncError::ValidationError("end must not be before start".to_string()));
    }
    let end_exclusive = end
        .checked_add_days(Days::new(1))
        .ok_or_else(|| SyncError::ValidationError("end date out of range".to_string()))?;

    Ok((
        start.and_time(chrono::NaiveTime::MIN).and_utc(),
        end_exclusive.and_time(chrono::NaiveTime::MIN).and_utc(),
    ))
}

/// Session reads and manual status changes.
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    lifecycle: SessionLifecycleService,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            lifecycle: SessionLifecycleService::new(),
        }
    }

    /// Sessions of a therapist between two dates (inclusive), with past
    /// scheduled sessions shown as attended.
    pub async fn list_sessions(
        &self,
        therapist_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SessionView>, SyncError> {
        let (from, to) = day_range(start, end)?;
        let now = self.clock.now();

        let sessions = self.store.sessions_in_range(therapist_id, from, to).await?;
        Ok(sessions
            .into_iter()
            .map(|session| self.lifecycle.view(session, now))
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn update_status(&self, session_id: Uuid, status: SessionStatus) -> Result<Session, SyncError> {
        let session = self
            .store
            .find_session(session_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("Session {} not found", session_id)))?;

        self.lifecycle.validate_status_transition(session.status, status)?;

        let mut tx = self.store.begin().await?;
        let updated = tx.set_session_status(session_id, status).await?;
        tx.commit().await?;

        info!("Session {} status changed: {} -> {}", session_id, session.status, status);
        Ok(updated)
    }
}
