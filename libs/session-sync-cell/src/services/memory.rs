// libs/session-sync-cell/src/services/memory.rs
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use patient_cell::{Patient, PatientDraft, Therapist};
use shared_utils::Clock;

use crate::error::StoreError;
use crate::models::{
    CalendarEventLog, NewSession, PaymentStatus, Session, SessionStatus, SessionUpdate,
    StoredWatchChannel,
};
use crate::services::store::{SessionStore, StoreTransaction};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    therapists: Vec<Therapist>,
    patients: Vec<Patient>,
    sessions: Vec<Session>,
    event_logs: Vec<CalendarEventLog>,
    watch_channels: Vec<StoredWatchChannel>,
}

#[derive(Debug, Default)]
struct FailurePlan {
    session_writes: AtomicUsize,
    // 1-based index of the session write that fails, 0 for none
    fail_at: AtomicUsize,
}

impl FailurePlan {
    fn check_session_write(&self) -> Result<(), StoreError> {
        let n = self.session_writes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_at.load(Ordering::SeqCst) == n {
            return Err(StoreError::Database(format!("injected failure on session write {}", n)));
        }
        Ok(())
    }
}

/// Session storage held in process memory. Transactions are serialised: each
/// one holds the state lock, writes to a staged copy, and swaps it in on
/// commit.
#[derive(Clone)]
pub struct InMemorySessionStore {
    state: Arc<Mutex<MemoryState>>,
    failures: Arc<FailurePlan>,
    clock: Arc<dyn Clock>,
}

impl InMemorySessionStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            failures: Arc::new(FailurePlan::default()),
            clock,
        }
    }

    /// Make the `n`-th session insert/update from now on fail.
    pub fn fail_on_session_write(&self, n: usize) {
        self.failures.session_writes.store(0, Ordering::SeqCst);
        self.failures.fail_at.store(n, Ordering::SeqCst);
    }

    pub async fn add_therapist(&self, therapist: Therapist) {
        self.state.lock().await.therapists.push(therapist);
    }

    pub async fn add_patient(&self, patient: Patient) {
        self.state.lock().await.patients.push(patient);
    }

    pub async fn add_session(&self, session: Session) {
        self.state.lock().await.sessions.push(session);
    }

    pub async fn add_watch_channel(&self, channel: StoredWatchChannel) {
        self.state.lock().await.watch_channels.push(channel);
    }

    pub async fn sessions(&self) -> Vec<Session> {
        self.state.lock().await.sessions.clone()
    }

    pub async fn patients(&self) -> Vec<Patient> {
        self.state.lock().await.patients.clone()
    }

    pub async fn event_logs(&self) -> Vec<CalendarEventLog> {
        self.state.lock().await.event_logs.clone()
    }

    pub async fn watch_channels(&self) -> Vec<StoredWatchChannel> {
        self.state.lock().await.watch_channels.clone()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn find_therapist(&self, therapist_id: Uuid) -> Result<Option<Therapist>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.therapists.iter().find(|t| t.id == therapist_id).cloned())
    }

    async fn find_therapist_by_calendar(&self, calendar_id: &str) -> Result<Option<Therapist>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .therapists
            .iter()
            .find(|t| t.google_calendar_id.as_deref() == Some(calendar_id))
            .cloned())
    }

    async fn find_watch_channel(&self, channel_id: &str) -> Result<Option<StoredWatchChannel>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.watch_channels.iter().find(|c| c.channel_id == channel_id).cloned())
    }

    async fn patients_for_therapist(&self, therapist_id: Uuid) -> Result<Vec<Patient>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .patients
            .iter()
            .filter(|p| p.therapist_id == therapist_id)
            .cloned()
            .collect())
    }

    async fn find_session(&self, session_id: Uuid) -> Result<Option<Session>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.sessions.iter().find(|s| s.id == session_id).cloned())
    }

    async fn find_session_by_event_id(&self, google_event_id: &str) -> Result<Option<Session>, StoreError> {
        let state = self.state.lock().await;
        Ok(find_by_event(&state.sessions, google_event_id).cloned())
    }

    async fn sessions_in_range(
        &self,
        therapist_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError> {
        let state = self.state.lock().await;
        let mut sessions: Vec<Session> = state
            .sessions
            .iter()
            .filter(|s| s.therapist_id == therapist_id && s.date >= from && s.date < to)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| (s.date, s.id));
        Ok(sessions)
    }

    async fn existing_event_ids(&self, google_event_ids: &[String]) -> Result<HashSet<String>, StoreError> {
        let state = self.state.lock().await;
        Ok(google_event_ids
            .iter()
            .filter(|id| find_by_event(&state.sessions, id).is_some())
            .cloned()
            .collect())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = (*guard).clone();
        Ok(Box::new(InMemoryTransaction {
            guard,
            staged,
            failures: self.failures.clone(),
            now: self.clock.now(),
        }))
    }
}

fn find_by_event<'a>(sessions: &'a [Session], google_event_id: &str) -> Option<&'a Session> {
    sessions
        .iter()
        .find(|s| s.google_event_id.as_deref() == Some(google_event_id))
}

pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
    failures: Arc<FailurePlan>,
    now: DateTime<Utc>,
}

impl InMemoryTransaction {
    fn session_mut(&mut self, session_id: Uuid) -> Result<&mut Session, StoreError> {
        self.staged
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| StoreError::NotFound(format!("session {}", session_id)))
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn find_session_by_event_id(&mut self, google_event_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(find_by_event(&self.staged.sessions, google_event_id).cloned())
    }

    async fn insert_session(&mut self, session: &NewSession) -> Result<Session, StoreError> {
        self.failures.check_session_write()?;

        if find_by_event(&self.staged.sessions, &session.google_event_id).is_some() {
            return Err(StoreError::ConstraintViolation(format!(
                "duplicate key value violates unique constraint \"sessions_google_event_id_key\" ({})",
                session.google_event_id
            )));
        }

        let inserted = Session {
            id: Uuid::new_v4(),
            therapist_id: session.therapist_id,
            patient_id: session.patient_id,
            date: session.date,
            google_event_id: Some(session.google_event_id.clone()),
            status: session.status,
            payment_status: None,
            session_price: session.session_price,
            created_at: self.now,
            updated_at: self.now,
        };
        self.staged.sessions.push(inserted.clone());
        Ok(inserted)
    }

    async fn upsert_session(&mut self, session: &NewSession) -> Result<(Session, bool), StoreError> {
        let existing = find_by_event(&self.staged.sessions, &session.google_event_id).map(|s| s.id);
        match existing {
            Some(id) => {
                self.failures.check_session_write()?;
                let now = self.now;
                let row = self.session_mut(id)?;
                row.therapist_id = session.therapist_id;
                row.patient_id = session.patient_id;
                row.date = session.date;
                row.updated_at = now;
                Ok((row.clone(), false))
            }
            None => Ok((self.insert_session(session).await?, true)),
        }
    }

    async fn update_session(&mut self, session_id: Uuid, update: &SessionUpdate) -> Result<Session, StoreError> {
        self.failures.check_session_write()?;

        let clash = self.staged.sessions.iter().any(|s| {
            s.id != session_id && s.google_event_id.as_deref() == Some(update.google_event_id.as_str())
        });
        if clash {
            return Err(StoreError::ConstraintViolation(format!(
                "google_event_id {} already in use",
                update.google_event_id
            )));
        }

        let now = self.now;
        let row = self.session_mut(session_id)?;
        row.therapist_id = update.therapist_id;
        row.patient_id = update.patient_id;
        row.date = update.date;
        row.google_event_id = Some(update.google_event_id.clone());
        if let Some(status) = update.status {
            row.status = status;
        }
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn set_session_status(&mut self, session_id: Uuid, status: SessionStatus) -> Result<Session, StoreError> {
        self.failures.check_session_write()?;
        let now = self.now;
        let row = self.session_mut(session_id)?;
        row.status = status;
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn set_payment_status(
        &mut self,
        session_id: Uuid,
        payment_status: Option<PaymentStatus>,
    ) -> Result<(), StoreError> {
        let now = self.now;
        let row = self.session_mut(session_id)?;
        row.payment_status = payment_status;
        row.updated_at = now;
        Ok(())
    }

    async fn upsert_patient(&mut self, draft: &PatientDraft) -> Result<Patient, StoreError> {
        let email = draft.normalized_email();
        let name = draft.name.trim().to_string();
        let now = self.now;

        let existing = self.staged.patients.iter_mut().find(|p| {
            p.therapist_id == draft.therapist_id
                && match &email {
                    Some(email) => p.has_email(email),
                    None => p.email.is_none() && p.name.to_lowercase() == name.to_lowercase(),
                }
        });

        if let Some(patient) = existing {
            if email.is_some() {
                patient.name = name;
            }
            if draft.phone.is_some() {
                patient.phone = draft.phone.clone();
            }
            if let Some(price) = draft.session_price {
                patient.session_price = price;
            }
            if draft.therapy_start_date.is_some() {
                patient.therapy_start_date = draft.therapy_start_date;
            }
            if draft.billing_start_date.is_some() {
                patient.billing_start_date = draft.billing_start_date;
            }
            patient.updated_at = now;
            return Ok(patient.clone());
        }

        let patient = Patient {
            id: Uuid::new_v4(),
            therapist_id: draft.therapist_id,
            name,
            email,
            phone: draft.phone.clone(),
            session_price: draft.session_price.unwrap_or(0),
            therapy_start_date: draft.therapy_start_date,
            billing_start_date: draft.billing_start_date,
            created_at: now,
            updated_at: now,
        };
        self.staged.patients.push(patient.clone());
        Ok(patient)
    }

    async fn insert_event_log(&mut self, log: &CalendarEventLog) -> Result<(), StoreError> {
        self.staged.event_logs.push(log.clone());
        Ok(())
    }

    async fn save_watch_channel(&mut self, channel: &StoredWatchChannel) -> Result<(), StoreError> {
        self.staged.watch_channels.retain(|c| c.channel_id != channel.channel_id);
        self.staged.watch_channels.push(channel.clone());
        Ok(())
    }

    async fn delete_watch_channel(&mut self, channel_id: &str) -> Result<bool, StoreError> {
        let before = self.staged.watch_channels.len();
        self.staged.watch_channels.retain(|c| c.channel_id != channel_id);
        Ok(self.staged.watch_channels.len() != before)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTransaction { mut guard, staged, .. } = *self;
        *guard = staged;
        Ok(())
    }
}
