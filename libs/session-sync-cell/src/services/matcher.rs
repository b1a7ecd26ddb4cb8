// libs/session-sync-cell/src/services/matcher.rs
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use calendar_cell::NormalizedEvent;
use patient_cell::{PatientResolver, ResolveError, Therapist};

use crate::error::StoreError;
use crate::models::{CalendarEventProcessingResult, CalendarEventType, ProcessingError, Session};
use crate::services::store::SessionStore;

/// Action implied by an event given the session (if any) already stored for
/// its external id. An unmatched cancellation is still `New`; the applier
/// treats it as inert.
pub fn classify(event: &NormalizedEvent, existing: Option<&Session>) -> CalendarEventType {
    match (existing, event.is_cancelled()) {
        (None, _) => CalendarEventType::New,
        (Some(_), true) => CalendarEventType::Cancel,
        (Some(_), false) => CalendarEventType::Update,
    }
}

/// Classifies calendar events against stored sessions. Reads only.
pub struct SessionMatcher {
    store: Arc<dyn SessionStore>,
    resolver: PatientResolver,
}

impl SessionMatcher {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            resolver: PatientResolver::new(),
        }
    }

    /// Build the processing result for `event`. `therapist` is the therapist
    /// bound to the calendar the event came from, when one is known.
    pub async fn match_event(
        &self,
        event: &NormalizedEvent,
        therapist: Option<&Therapist>,
    ) -> Result<CalendarEventProcessingResult, StoreError> {
        let existing = self.store.find_session_by_event_id(&event.event_id).await?;
        let event_type = classify(event, existing.as_ref());
        let session_id = existing.as_ref().map(|s| s.id);

        let Some(therapist) = therapist else {
            warn!("Event {}: therapist not found", event.event_id);
            return Ok(CalendarEventProcessingResult::failed(
                event_type,
                session_id,
                ProcessingError::TherapistNotFound,
            ));
        };

        let patients = self.store.patients_for_therapist(therapist.id).await?;
        let patient_id: Option<Uuid> = match self.resolver.resolve(event, therapist, &patients) {
            Ok((patient, method)) => {
                debug!("Event {} matched patient {} via {:?}", event.event_id, patient.id, method);
                Some(patient.id)
            }
            // A cancellation of a known session does not need the event to
            // still identify the patient.
            Err(_) if event_type == CalendarEventType::Cancel => existing.as_ref().map(|s| s.patient_id),
            Err(ResolveError::AmbiguousName { name, count }) => {
                warn!("Event {}: {} patients named {}", event.event_id, count, name);
                None
            }
            Err(ResolveError::NotFound { candidate_emails, candidate_name }) => {
                warn!(
                    "Event {}: no patient for emails {:?} or name {:?}",
                    event.event_id, candidate_emails, candidate_name
                );
                None
            }
        };

        let Some(patient_id) = patient_id else {
            return Ok(CalendarEventProcessingResult {
                event_type,
                session_id,
                therapist_id: Some(therapist.id),
                patient_id: None,
                error: Some(ProcessingError::PatientNotFound),
            });
        };

        Ok(CalendarEventProcessingResult {
            event_type,
            session_id,
            therapist_id: Some(therapist.id),
            patient_id: Some(patient_id),
            error: None,
        })
    }
}
