// libs/session-sync-cell/src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use calendar_cell::GoogleCalendarEvent;

// ==============================================================================
// CORE SESSION MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "session_status", rename_all = "lowercase")]
pub enum SessionStatus {
    /// Scheduled
    Agendada,
    /// Attended
    Compareceu,
    /// Cancelled
    Cancelada,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Agendada => write!(f, "agendada"),
            SessionStatus::Compareceu => write!(f, "compareceu"),
            SessionStatus::Cancelada => write!(f, "cancelada"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
pub enum PaymentStatus {
    NotBilled,
    Pending,
    Billed,
    Paid,
}

impl PaymentStatus {
    /// Statuses the import seeding may overwrite.
    pub fn is_seedable(status: Option<PaymentStatus>) -> bool {
        matches!(
            status,
            None | Some(PaymentStatus::NotBilled) | Some(PaymentStatus::Pending)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub therapist_id: Uuid,
    pub patient_id: Uuid,
    pub date: DateTime<Utc>,
    pub google_event_id: Option<String>,
    pub status: SessionStatus,
    pub payment_status: Option<PaymentStatus>,
    pub session_price: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub therapist_id: Uuid,
    pub patient_id: Uuid,
    pub date: DateTime<Utc>,
    pub google_event_id: String,
    pub status: SessionStatus,
    pub session_price: Option<i64>,
}

/// Field changes for an existing session. `status: None` leaves it untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUpdate {
    pub therapist_id: Uuid,
    pub patient_id: Uuid,
    pub date: DateTime<Utc>,
    pub google_event_id: String,
    pub status: Option<SessionStatus>,
}

impl SessionUpdate {
    pub fn changes(&self, session: &Session) -> bool {
        session.therapist_id != self.therapist_id
            || session.patient_id != self.patient_id
            || session.date != self.date
            || session.google_event_id.as_deref() != Some(self.google_event_id.as_str())
            || self.status.map(|s| s != session.status).unwrap_or(false)
    }
}

// ==============================================================================
// RECONCILIATION MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CalendarEventType {
    New,
    Update,
    Cancel,
}

impl CalendarEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarEventType::New => "new",
            CalendarEventType::Update => "update",
            CalendarEventType::Cancel => "cancel",
        }
    }
}

impl fmt::Display for CalendarEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons an event cannot be reconciled. Carried as data in the processing
/// result, never raised.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
pub enum ProcessingError {
    #[error("Therapist not found")]
    #[serde(rename = "Therapist not found")]
    TherapistNotFound,

    #[error("Patient not found")]
    #[serde(rename = "Patient not found")]
    PatientNotFound,

    #[error("Invalid date")]
    #[serde(rename = "Invalid date")]
    InvalidDate,
}

/// Classification of one calendar event against stored sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarEventProcessingResult {
    pub event_type: CalendarEventType,
    pub session_id: Option<Uuid>,
    pub therapist_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub error: Option<ProcessingError>,
}

impl CalendarEventProcessingResult {
    pub fn failed(event_type: CalendarEventType, session_id: Option<Uuid>, error: ProcessingError) -> Self {
        Self {
            event_type,
            session_id,
            therapist_id: None,
            patient_id: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// What the applier did with a classified event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ApplyOutcome {
    Created { session_id: Uuid },
    Updated { session_id: Uuid },
    Cancelled { session_id: Uuid },
    Unchanged { session_id: Uuid },
    Skipped { reason: String },
}

impl ApplyOutcome {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            ApplyOutcome::Created { .. } | ApplyOutcome::Updated { .. } | ApplyOutcome::Cancelled { .. }
        )
    }
}

/// Append-only audit row written alongside every session mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarEventLog {
    pub google_event_id: String,
    pub event_type: CalendarEventType,
    pub session_date: DateTime<Utc>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventProcessing {
    pub event_id: String,
    pub result: CalendarEventProcessingResult,
    pub outcome: ApplyOutcome,
}

// ==============================================================================
// WEBHOOK & WATCH CHANNEL MODELS
// ==============================================================================

/// Push notification headers sent by Google Calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookNotification {
    pub channel_id: String,
    pub resource_id: Option<String>,
    pub resource_state: String,
    pub message_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Ignored { reason: String },
    Processed(EventProcessing),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct StoredWatchChannel {
    pub channel_id: String,
    pub resource_id: String,
    pub calendar_id: String,
    pub therapist_id: Uuid,
    pub expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWatchRequest {
    pub therapist_id: Uuid,
}

// ==============================================================================
// IMPORT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSessionRequest {
    pub date: DateTime<Utc>,
    pub google_event_id: String,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportPatientRequest {
    pub therapist_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Integer cents.
    pub session_price: i64,
    pub therapy_start_date: Option<NaiveDate>,
    pub billing_start_date: NaiveDate,
    #[serde(default)]
    pub sessions: Vec<ImportSessionRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportPatientResponse {
    pub patient_id: Uuid,
    pub session_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportEventsRequest {
    pub therapist_id: Uuid,
    pub events: Vec<GoogleCalendarEvent>,
    /// Used for patients that have no billing start date of their own.
    pub default_billing_start_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportedPatient {
    pub patient_id: Uuid,
    pub name: String,
    pub created_from_event: bool,
    pub session_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedEvent {
    pub event_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportEventsResponse {
    pub patients: Vec<ImportedPatient>,
    pub skipped: Vec<SkippedEvent>,
}

// ==============================================================================
// SESSION QUERY MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SessionRangeQuery {
    pub therapist_id: Uuid,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSessionStatusRequest {
    pub status: SessionStatus,
}

/// A stored session as shown to users, with auto check-in applied.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    pub effective_status: SessionStatus,
    pub auto_checked_in: bool,
}
