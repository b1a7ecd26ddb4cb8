// libs/session-sync-cell/src/services/applier.rs
use std::sync::Arc;

use tracing::{debug, info, instrument};

use calendar_cell::NormalizedEvent;

use crate::error::StoreError;
use crate::models::{
    ApplyOutcome, CalendarEventLog, CalendarEventProcessingResult, CalendarEventType, NewSession,
    SessionStatus, SessionUpdate,
};
use crate::services::store::{SessionStore, StoreTransaction};

/// Executes a matcher decision. Each call is one transaction holding the
/// session write and its audit row.
pub struct ReconciliationApplier {
    store: Arc<dyn SessionStore>,
}

impl ReconciliationApplier {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, result, event), fields(event_id = %event.event_id, event_type = %result.event_type))]
    pub async fn apply(
        &self,
        result: &CalendarEventProcessingResult,
        event: &NormalizedEvent,
    ) -> Result<ApplyOutcome, StoreError> {
        if let Some(error) = result.error {
            return Ok(ApplyOutcome::Skipped { reason: error.to_string() });
        }

        let (Some(therapist_id), Some(patient_id)) = (result.therapist_id, result.patient_id) else {
            return Ok(ApplyOutcome::Skipped {
                reason: "unresolved therapist or patient".to_string(),
            });
        };

        if result.event_type == CalendarEventType::New && event.is_cancelled() {
            debug!("Cancelled event without a session, nothing to do");
            return Ok(ApplyOutcome::Skipped {
                reason: "cancelled event has no session".to_string(),
            });
        }

        let mut tx = self.store.begin().await?;
        let outcome = match result.event_type {
            CalendarEventType::New => {
                let new_session = NewSession {
                    therapist_id,
                    patient_id,
                    date: event.starts_at,
                    google_event_id: event.event_id.clone(),
                    status: SessionStatus::Agendada,
                    session_price: None,
                };
                let (session, inserted) = tx.upsert_session(&new_session).await?;
                if inserted {
                    ApplyOutcome::Created { session_id: session.id }
                } else {
                    // Lost an insert race with another delivery of this event
                    debug!("Session {} already existed, applied as update", session.id);
                    ApplyOutcome::Updated { session_id: session.id }
                }
            }
            CalendarEventType::Update => {
                let Some(session) = tx.find_session_by_event_id(&event.event_id).await? else {
                    return Ok(ApplyOutcome::Skipped {
                        reason: "session no longer exists".to_string(),
                    });
                };

                let update = SessionUpdate {
                    therapist_id,
                    patient_id,
                    date: event.starts_at,
                    google_event_id: event.event_id.clone(),
                    status: None,
                };

                if update.changes(&session) {
                    tx.update_session(session.id, &update).await?;
                    ApplyOutcome::Updated { session_id: session.id }
                } else {
                    ApplyOutcome::Unchanged { session_id: session.id }
                }
            }
            CalendarEventType::Cancel => {
                let Some(session) = tx.find_session_by_event_id(&event.event_id).await? else {
                    return Ok(ApplyOutcome::Skipped {
                        reason: "session no longer exists".to_string(),
                    });
                };

                if session.status == SessionStatus::Cancelada {
                    ApplyOutcome::Unchanged { session_id: session.id }
                } else {
                    tx.set_session_status(session.id, SessionStatus::Cancelada).await?;
                    ApplyOutcome::Cancelled { session_id: session.id }
                }
            }
        };

        if outcome.is_mutation() {
            write_audit_log(tx.as_mut(), result.event_type, event).await?;
            tx.commit().await?;
            info!("Applied {} for event {}: {:?}", result.event_type, event.event_id, outcome);
        }

        Ok(outcome)
    }
}

async fn write_audit_log(
    tx: &mut dyn StoreTransaction,
    event_type: CalendarEventType,
    event: &NormalizedEvent,
) -> Result<(), StoreError> {
    tx.insert_event_log(&CalendarEventLog {
        google_event_id: event.event_id.clone(),
        event_type,
        session_date: event.starts_at,
        email: event.creator_email.clone(),
    })
    .await
}
