// libs/session-sync-cell/src/services/store.rs
use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use patient_cell::{Patient, PatientDraft, Therapist};

use crate::error::StoreError;
use crate::models::{
    CalendarEventLog, NewSession, PaymentStatus, Session, SessionStatus, SessionUpdate,
    StoredWatchChannel,
};

/// Read access to therapists, patients and sessions, plus the entry point for
/// every write through [`StoreTransaction`].
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find_therapist(&self, therapist_id: Uuid) -> Result<Option<Therapist>, StoreError>;

    async fn find_therapist_by_calendar(&self, calendar_id: &str) -> Result<Option<Therapist>, StoreError>;

    async fn find_watch_channel(&self, channel_id: &str) -> Result<Option<StoredWatchChannel>, StoreError>;

    async fn patients_for_therapist(&self, therapist_id: Uuid) -> Result<Vec<Patient>, StoreError>;

    async fn find_session(&self, session_id: Uuid) -> Result<Option<Session>, StoreError>;

    async fn find_session_by_event_id(&self, google_event_id: &str) -> Result<Option<Session>, StoreError>;

    /// Sessions of a therapist dated in `[from, to)`, ordered by date.
    async fn sessions_in_range(
        &self,
        therapist_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError>;

    /// The subset of `google_event_ids` that already back a session.
    async fn existing_event_ids(&self, google_event_ids: &[String]) -> Result<HashSet<String>, StoreError>;

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

/// One unit of work. Nothing is visible to other readers until `commit`;
/// dropping the transaction discards every write made through it.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn find_session_by_event_id(&mut self, google_event_id: &str) -> Result<Option<Session>, StoreError>;

    /// Plain insert. A second session for the same event id is a
    /// `ConstraintViolation`.
    async fn insert_session(&mut self, session: &NewSession) -> Result<Session, StoreError>;

    /// Insert, or when a session for the event id already exists, update its
    /// date, patient and therapist. Status and price of an existing row are
    /// kept. The flag is true when a row was inserted.
    async fn upsert_session(&mut self, session: &NewSession) -> Result<(Session, bool), StoreError>;

    async fn update_session(&mut self, session_id: Uuid, update: &SessionUpdate) -> Result<Session, StoreError>;

    async fn set_session_status(&mut self, session_id: Uuid, status: SessionStatus) -> Result<Session, StoreError>;

    async fn set_payment_status(
        &mut self,
        session_id: Uuid,
        payment_status: Option<PaymentStatus>,
    ) -> Result<(), StoreError>;

    /// Create or update a patient, matched within the therapist by email, or
    /// by case-insensitive name when the draft has no email.
    async fn upsert_patient(&mut self, draft: &PatientDraft) -> Result<Patient, StoreError>;

    async fn insert_event_log(&mut self, log: &CalendarEventLog) -> Result<(), StoreError>;

    async fn save_watch_channel(&mut self, channel: &StoredWatchChannel) -> Result<(), StoreError>;

    async fn delete_watch_channel(&mut self, channel_id: &str) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
