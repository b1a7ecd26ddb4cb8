use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate};

/// Label given to patients created from calendar events that matched nobody
/// and carried no usable name.
pub const UNMATCHED_PATIENT_LABEL: &str = "Paciente não identificado";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Therapist {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub google_calendar_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Patient {
    pub id: Uuid,
    pub therapist_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Integer cents.
    pub session_price: i64,
    pub therapy_start_date: Option<NaiveDate>,
    /// Sessions from this date on are billed by LV Notas.
    pub billing_start_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn has_email(&self, email: &str) -> bool {
        self.email
            .as_deref()
            .map(|e| e.trim().eq_ignore_ascii_case(email.trim()))
            .unwrap_or(false)
    }
}

/// Fields for creating or updating a patient during import. Matched against
/// existing patients by email within the therapist, or by name when the draft
/// has no email.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientDraft {
    pub therapist_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub session_price: Option<i64>,
    pub therapy_start_date: Option<NaiveDate>,
    pub billing_start_date: Option<NaiveDate>,
}

impl PatientDraft {
    pub fn normalized_email(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    AttendeeEmail,
    TitleName,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    #[error("Patient not found")]
    NotFound {
        candidate_emails: Vec<String>,
        candidate_name: Option<String>,
    },

    #[error("{count} patients share the name {name}")]
    AmbiguousName { name: String, count: usize },
}
