// libs/session-sync-cell/src/services/import.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use calendar_cell::{normalize_event, NormalizedEvent};
use patient_cell::{
    patient_candidate_emails, Patient, PatientDraft, PatientResolver, ResolveError, Therapist,
    UNMATCHED_PATIENT_LABEL,
};
use shared_utils::Clock;

use crate::error::{StoreError, SyncError};
use crate::models::{
    ImportEventsRequest, ImportEventsResponse, ImportPatientRequest, ImportPatientResponse,
    ImportedPatient, NewSession, PaymentStatus, Session, SessionStatus, SessionUpdate,
    SkippedEvent,
};
use crate::services::store::{SessionStore, StoreTransaction};

/// Payment status an imported session should carry: none before the billing
/// start date, `pending` once it is both billable and past, `not_billed` when
/// billable but still ahead. The cutoff compares the session's UTC date.
pub fn seed_payment_status(
    session_date: DateTime<Utc>,
    billing_start_date: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> Option<PaymentStatus> {
    let billing_start = billing_start_date?;
    if session_date.date_naive() < billing_start {
        return None;
    }

    if session_date < now {
        Some(PaymentStatus::Pending)
    } else {
        Some(PaymentStatus::NotBilled)
    }
}

/// Batch import of patients and their calendar sessions. Every call runs in
/// a single transaction.
pub struct BulkImportService {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    resolver: PatientResolver,
}

impl BulkImportService {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            resolver: PatientResolver::new(),
        }
    }

    /// Upsert one patient and the sessions listed for them.
    #[instrument(skip(self, request), fields(therapist_id = %request.therapist_id))]
    pub async fn import_patient(&self, request: ImportPatientRequest) -> Result<ImportPatientResponse, SyncError> {
        validate_patient_request(&request)?;
        self.require_therapist(request.therapist_id).await?;

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let patient = tx
            .upsert_patient(&PatientDraft {
                therapist_id: request.therapist_id,
                name: request.name.trim().to_string(),
                email: request.email.clone(),
                phone: request.phone.clone(),
                session_price: Some(request.session_price),
                therapy_start_date: request.therapy_start_date,
                billing_start_date: Some(request.billing_start_date),
            })
            .await?;

        let mut sessions = Vec::with_capacity(request.sessions.len());
        for item in &request.sessions {
            let session = upsert_session(
                tx.as_mut(),
                &patient,
                &item.google_event_id,
                item.date,
                item.status,
                Some(item.status),
            )
            .await?;
            sessions.push(session);
        }

        seed_payment_statuses(tx.as_mut(), &sessions, patient.billing_start_date, now).await?;
        tx.commit().await?;

        info!(
            "Imported patient {} with {} sessions",
            patient.id,
            sessions.len()
        );

        Ok(ImportPatientResponse {
            patient_id: patient.id,
            session_ids: sessions.iter().map(|s| s.id).collect(),
        })
    }

    /// Import raw calendar events for a therapist, creating patients for
    /// events that match nobody.
    #[instrument(skip(self, request), fields(therapist_id = %request.therapist_id, events = request.events.len()))]
    pub async fn import_events(&self, request: ImportEventsRequest) -> Result<ImportEventsResponse, SyncError> {
        let therapist = self.require_therapist(request.therapist_id).await?;
        let known_patients = self.store.patients_for_therapist(therapist.id).await?;
        let now = self.clock.now();

        let mut skipped = Vec::new();
        let mut planned: Vec<(NormalizedEvent, PatientRef)> = Vec::new();

        for raw in &request.events {
            let event = match normalize_event(raw) {
                Ok(event) => event,
                Err(e) => {
                    warn!("Skipping event {}: {}", raw.id, e);
                    skipped.push(SkippedEvent {
                        event_id: raw.id.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match self.patient_for(&event, &therapist, &known_patients) {
                Ok(patient_ref) => planned.push((event, patient_ref)),
                Err(reason) => {
                    warn!("Skipping event {}: {}", event.event_id, reason);
                    skipped.push(SkippedEvent {
                        event_id: event.event_id.clone(),
                        reason,
                    });
                }
            }
        }

        let mut tx = self.store.begin().await?;

        let mut patients: HashMap<Uuid, Patient> =
            known_patients.into_iter().map(|p| (p.id, p)).collect();
        let mut created: Vec<(NewPatientKey, Uuid)> = Vec::new();
        let mut imported: Vec<ImportedPatient> = Vec::new();
        let mut sessions: Vec<(Session, Option<NaiveDate>)> = Vec::new();

        for (event, patient_ref) in planned {
            let existing = tx.find_session_by_event_id(&event.event_id).await?;
            if event.is_cancelled() && existing.is_none() {
                skipped.push(SkippedEvent {
                    event_id: event.event_id.clone(),
                    reason: "cancelled event has no session".to_string(),
                });
                continue;
            }

            let (patient_id, created_from_event) = match (patient_ref, existing) {
                (PatientRef::Existing(id), _) => (id, false),
                // The event no longer names anyone; the session keeps its patient.
                (PatientRef::New(_), Some(session)) => (session.patient_id, false),
                (PatientRef::New(key), None) => {
                    match created.iter().find(|(seen, _)| seen.same_patient(&key)) {
                        Some((_, id)) => (*id, true),
                        None => {
                            let patient = tx
                                .upsert_patient(&PatientDraft {
                                    therapist_id: therapist.id,
                                    name: key.name.clone(),
                                    email: key.email.clone(),
                                    phone: None,
                                    session_price: None,
                                    therapy_start_date: None,
                                    billing_start_date: request.default_billing_start_date,
                                })
                                .await?;
                            debug!("Created patient {} ({}) from event {}", patient.id, patient.name, event.event_id);
                            let id = patient.id;
                            created.push((key, id));
                            patients.insert(id, patient);
                            (id, true)
                        }
                    }
                }
            };

            let Some(patient) = patients.get(&patient_id) else {
                return Err(SyncError::NotFound(format!("patient {}", patient_id)));
            };

            let (insert_status, update_status) = if event.is_cancelled() {
                (SessionStatus::Cancelada, Some(SessionStatus::Cancelada))
            } else {
                (SessionStatus::Agendada, None)
            };

            let session = upsert_session(
                tx.as_mut(),
                patient,
                &event.event_id,
                event.starts_at,
                insert_status,
                update_status,
            )
            .await?;

            let billing_start = patient.billing_start_date.or(request.default_billing_start_date);
            match imported.iter_mut().find(|p| p.patient_id == patient_id) {
                Some(entry) => entry.session_ids.push(session.id),
                None => imported.push(ImportedPatient {
                    patient_id,
                    name: patient.name.clone(),
                    created_from_event,
                    session_ids: vec![session.id],
                }),
            }
            sessions.push((session, billing_start));
        }

        for (session, billing_start) in &sessions {
            seed_payment_statuses(tx.as_mut(), std::slice::from_ref(session), *billing_start, now).await?;
        }

        tx.commit().await?;

        info!(
            "Imported {} sessions for {} patients, {} events skipped",
            sessions.len(),
            imported.len(),
            skipped.len()
        );

        Ok(ImportEventsResponse {
            patients: imported,
            skipped,
        })
    }

    async fn require_therapist(&self, therapist_id: Uuid) -> Result<Therapist, SyncError> {
        self.store
            .find_therapist(therapist_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("Therapist {} not found", therapist_id)))
    }

    fn patient_for(
        &self,
        event: &NormalizedEvent,
        therapist: &Therapist,
        patients: &[Patient],
    ) -> Result<PatientRef, String> {
        match self.resolver.resolve(event, therapist, patients) {
            Ok((patient, _)) => Ok(PatientRef::Existing(patient.id)),
            Err(ResolveError::AmbiguousName { name, count }) => {
                Err(format!("{} patients share the name {}", count, name))
            }
            Err(ResolveError::NotFound { candidate_name, .. }) => {
                let email = patient_candidate_emails(event, &therapist.email).into_iter().next();
                Ok(PatientRef::New(NewPatientKey {
                    name: candidate_name.unwrap_or_else(|| UNMATCHED_PATIENT_LABEL.to_string()),
                    email,
                }))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct NewPatientKey {
    name: String,
    email: Option<String>,
}

impl NewPatientKey {
    /// Whether two unmatched events in one batch belong to the same new
    /// patient. Two emails decide on their own. Otherwise the names must match
    /// case-insensitively, and the unmatched label never joins an event with
    /// an email to one without.
    fn same_patient(&self, other: &NewPatientKey) -> bool {
        let same_name = self.name.to_lowercase() == other.name.to_lowercase();
        match (&self.email, &other.email) {
            (Some(a), Some(b)) => a == b,
            (None, None) => same_name,
            _ => same_name && self.name != UNMATCHED_PATIENT_LABEL,
        }
    }
}

#[derive(Debug, Clone)]
enum PatientRef {
    Existing(Uuid),
    New(NewPatientKey),
}

fn validate_patient_request(request: &ImportPatientRequest) -> Result<(), SyncError> {
    if request.name.trim().is_empty() {
        return Err(SyncError::ValidationError("name is required".to_string()));
    }
    if request.session_price < 0 {
        return Err(SyncError::ValidationError("session_price must not be negative".to_string()));
    }
    if let Some(item) = request.sessions.iter().find(|s| s.google_event_id.trim().is_empty()) {
        return Err(SyncError::ValidationError(format!(
            "session dated {} has no google_event_id",
            item.date
        )));
    }
    Ok(())
}

/// Update the session for `google_event_id` when it exists, insert it
/// otherwise. The price is copied from the patient on insert only.
async fn upsert_session(
    tx: &mut dyn StoreTransaction,
    patient: &Patient,
    google_event_id: &str,
    date: DateTime<Utc>,
    insert_status: SessionStatus,
    update_status: Option<SessionStatus>,
) -> Result<Session, StoreError> {
    match tx.find_session_by_event_id(google_event_id).await? {
        Some(existing) => {
            let update = SessionUpdate {
                therapist_id: patient.therapist_id,
                patient_id: patient.id,
                date,
                google_event_id: google_event_id.to_string(),
                status: update_status,
            };
            if update.changes(&existing) {
                tx.update_session(existing.id, &update).await
            } else {
                Ok(existing)
            }
        }
        None => {
            tx.insert_session(&NewSession {
                therapist_id: patient.therapist_id,
                patient_id: patient.id,
                date,
                google_event_id: google_event_id.to_string(),
                status: insert_status,
                session_price: Some(patient.session_price),
            })
            .await
        }
    }
}

/// Write seeded payment statuses, leaving billed and paid sessions alone.
async fn seed_payment_statuses(
    tx: &mut dyn StoreTransaction,
    sessions: &[Session],
    billing_start_date: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    for session in sessions {
        if !PaymentStatus::is_seedable(session.payment_status) {
            continue;
        }
        let seeded = seed_payment_status(session.date, billing_start_date, now);
        if seeded != session.payment_status {
            tx.set_payment_status(session.id, seeded).await?;
        }
    }
    Ok(())
}
