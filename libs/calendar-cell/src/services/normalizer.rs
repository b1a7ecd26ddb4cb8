// libs/calendar-cell/src/services/normalizer.rs
use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use crate::models::{
    CalendarError, EventDateTime, EventPerson, EventStatus, GoogleCalendarEvent,
    NormalizedAttendee, NormalizedEvent,
};

/// Map a raw calendar event onto the canonical form used for reconciliation.
///
/// The start instant comes from `start.dateTime` when it parses, otherwise from
/// `start.date` (taken as 00:00 UTC). An event with neither is rejected with
/// `CalendarError::InvalidDate`.
pub fn normalize_event(raw: &GoogleCalendarEvent) -> Result<NormalizedEvent, CalendarError> {
    let (starts_at, all_day) = raw
        .start
        .as_ref()
        .and_then(effective_start)
        .ok_or_else(|| {
            debug!("Event {} has no usable start date", raw.id);
            CalendarError::InvalidDate {
                event_id: raw.id.clone(),
            }
        })?;

    let attendees = raw
        .attendees
        .iter()
        .filter_map(|a| {
            normalize_email(a.email.as_deref()).map(|email| NormalizedAttendee {
                email,
                response_status: a.response_status.clone(),
            })
        })
        .collect();

    Ok(NormalizedEvent {
        event_id: raw.id.clone(),
        status: EventStatus::from_google(raw.status.as_deref()),
        starts_at,
        all_day,
        summary: raw.summary.as_deref().unwrap_or_default().trim().to_string(),
        creator_email: person_email(raw.creator.as_ref()),
        organizer_email: person_email(raw.organizer.as_ref()),
        attendees,
        updated: raw.updated,
    })
}

fn effective_start(start: &EventDateTime) -> Option<(DateTime<Utc>, bool)> {
    if let Some(instant) = start.date_time.as_deref().and_then(parse_instant) {
        return Some((instant, false));
    }

    start
        .date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|midnight| (midnight.and_utc(), true))
}

fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn person_email(person: Option<&EventPerson>) -> Option<String> {
    person.and_then(|p| normalize_email(p.email.as_deref()))
}

fn normalize_email(email: Option<&str>) -> Option<String> {
    email
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
}
