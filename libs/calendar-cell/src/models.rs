// libs/calendar-cell/src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==============================================================================
// GOOGLE CALENDAR WIRE SCHEMA
// ==============================================================================

/// An event as returned by the Calendar API. Webhook fetches, bulk listings and
/// client-curated import payloads all deserialize into this one shape; every
/// field except `id` may be absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCalendarEvent {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<EventDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EventDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<EventPerson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizer: Option<EventPerson>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<EventAttendee>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

/// `start`/`end` object: either `dateTime` (an instant) or `date` (all-day).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventPerson {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, rename = "self")]
    pub is_self: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventAttendee {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub response_status: Option<String>,
    #[serde(default)]
    pub organizer: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsListResponse {
    #[serde(default)]
    pub items: Vec<GoogleCalendarEvent>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub channel_type: String,
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchResponse {
    pub id: String,
    pub resource_id: String,
    #[serde(default)]
    pub resource_uri: Option<String>,
    /// Milliseconds since the epoch, sent as a string.
    #[serde(default)]
    pub expiration: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopChannelRequest {
    pub id: String,
    pub resource_id: String,
}

/// A watch channel Google has accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchChannel {
    pub channel_id: String,
    pub resource_id: String,
    pub calendar_id: String,
    pub expiration: Option<DateTime<Utc>>,
}

/// OAuth token endpoint response. Fields are optional on the wire and
/// validated into an `IssuedToken` before use.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

// ==============================================================================
// CANONICAL EVENT
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
    Other(String),
}

impl EventStatus {
    pub fn from_google(status: Option<&str>) -> Self {
        match status.map(str::trim) {
            None | Some("") | Some("confirmed") => EventStatus::Confirmed,
            Some("tentative") => EventStatus::Tentative,
            Some("cancelled") => EventStatus::Cancelled,
            Some(other) => EventStatus::Other(other.to_string()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, EventStatus::Cancelled)
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventStatus::Confirmed => write!(f, "confirmed"),
            EventStatus::Tentative => write!(f, "tentative"),
            EventStatus::Cancelled => write!(f, "cancelled"),
            EventStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedAttendee {
    pub email: String,
    pub response_status: Option<String>,
}

/// The parts of a calendar event the reconciliation pipeline works with.
/// Emails are trimmed and lowercased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub event_id: String,
    pub status: EventStatus,
    pub starts_at: DateTime<Utc>,
    pub all_day: bool,
    pub summary: String,
    pub creator_email: Option<String>,
    pub organizer_email: Option<String>,
    pub attendees: Vec<NormalizedAttendee>,
    pub updated: Option<DateTime<Utc>>,
}

impl NormalizedEvent {
    pub fn is_cancelled(&self) -> bool {
        self.status.is_cancelled()
    }

    pub fn attendee_emails(&self) -> impl Iterator<Item = &str> {
        self.attendees.iter().map(|a| a.email.as_str())
    }
}

// ==============================================================================
// ACCESS MODES & REQUESTS
// ==============================================================================

/// Which credential a calendar call runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarAccess {
    /// The process-wide service account (optionally impersonating a user).
    ServiceAccount,
    /// A user's own OAuth access token, supplied by the client.
    UserToken(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportEventsQuery {
    pub calendar_id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default)]
    pub use_user_token: bool,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum CalendarError {
    #[error("Google Calendar is not configured")]
    NotConfigured,

    #[error("Invalid date on event {event_id}")]
    InvalidDate { event_id: String },

    #[error("Calendar API unavailable: {message}")]
    UpstreamUnavailable { message: String },

    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    #[error("Invalid calendar API response: {0}")]
    InvalidResponse(String),

    #[error("Credential error: {0}")]
    Credentials(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<reqwest::Error> for CalendarError {
    fn from(err: reqwest::Error) -> Self {
        CalendarError::UpstreamUnavailable {
            message: err.to_string(),
        }
    }
}
