// libs/session-sync-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::models::{Session, SessionStatus, SessionView};

pub struct SessionLifecycleService;

impl SessionLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a manual status change is allowed
    pub fn validate_status_transition(
        &self,
        current_status: SessionStatus,
        new_status: SessionStatus,
    ) -> Result<(), SyncError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(SyncError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(())
    }

    pub fn get_valid_transitions(&self, current_status: SessionStatus) -> Vec<SessionStatus> {
        match current_status {
            SessionStatus::Agendada => vec![SessionStatus::Compareceu, SessionStatus::Cancelada],
            SessionStatus::Compareceu => vec![SessionStatus::Agendada, SessionStatus::Cancelada],
            SessionStatus::Cancelada => vec![SessionStatus::Agendada],
        }
    }

    /// Status shown for a session at `now`: a scheduled session whose date has
    /// passed counts as attended.
    pub fn effective_status(&self, session: &Session, now: DateTime<Utc>) -> SessionStatus {
        match session.status {
            SessionStatus::Agendada if session.date < now => SessionStatus::Compareceu,
            status => status,
        }
    }

    pub fn view(&self, session: Session, now: DateTime<Utc>) -> SessionView {
        let effective_status = self.effective_status(&session, now);
        SessionView {
            auto_checked_in: effective_status != session.status,
            effective_status,
            session,
        }
    }
}

impl Default for SessionLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}
