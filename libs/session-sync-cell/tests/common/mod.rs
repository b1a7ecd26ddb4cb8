#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use mockall::mock;
use uuid::Uuid;

use calendar_cell::{
    CalendarAccess, CalendarClient, CalendarError, EventAttendee, EventDateTime, EventPerson,
    GoogleCalendarEvent, WatchChannel,
};
use patient_cell::{Patient, Therapist};
use session_sync_cell::{InMemorySessionStore, StoredWatchChannel};
use shared_utils::test_utils::FixedClock;

pub const NOW: &str = "2025-03-10T12:00:00Z";
pub const THERAPIST_EMAIL: &str = "ana@lvnotas.com";
pub const CALENDAR_ID: &str = "ana@lvnotas.com";
pub const CHANNEL_ID: &str = "channel-1";

mock! {
    pub Calendar {}

    #[async_trait]
    impl CalendarClient for Calendar {
        async fn list_events(
            &self,
            calendar_id: &str,
            time_min: DateTime<Utc>,
            time_max: DateTime<Utc>,
            access: &CalendarAccess,
        ) -> Result<Vec<GoogleCalendarEvent>, CalendarError>;

        async fn recently_updated_events(
            &self,
            calendar_id: &str,
            updated_min: DateTime<Utc>,
            max_results: u32,
        ) -> Result<Vec<GoogleCalendarEvent>, CalendarError>;

        async fn watch_calendar(
            &self,
            calendar_id: &str,
            channel_id: &str,
            webhook_url: &str,
        ) -> Result<WatchChannel, CalendarError>;

        async fn stop_channel(&self, channel_id: &str, resource_id: &str) -> Result<(), CalendarError>;
    }
}

pub struct Fixture {
    pub store: Arc<InMemorySessionStore>,
    pub clock: Arc<FixedClock>,
    pub therapist: Therapist,
}

/// Store with one therapist bound to `CALENDAR_ID` and a watch channel on it.
pub async fn fixture() -> Fixture {
    let clock = FixedClock::at(NOW);
    let store = Arc::new(InMemorySessionStore::new(clock.clone()));
    let therapist = Therapist {
        id: Uuid::new_v4(),
        name: "Ana Lima".to_string(),
        email: THERAPIST_EMAIL.to_string(),
        google_calendar_id: Some(CALENDAR_ID.to_string()),
    };

    store.add_therapist(therapist.clone()).await;
    store
        .add_watch_channel(StoredWatchChannel {
            channel_id: CHANNEL_ID.to_string(),
            resource_id: "resource-1".to_string(),
            calendar_id: CALENDAR_ID.to_string(),
            therapist_id: therapist.id,
            expiration: None,
        })
        .await;

    Fixture { store, clock, therapist }
}

impl Fixture {
    pub async fn add_patient(&self, name: &str, email: Option<&str>) -> Patient {
        self.add_patient_with(name, email, 20000, None).await
    }

    pub async fn add_patient_with(
        &self,
        name: &str,
        email: Option<&str>,
        session_price: i64,
        billing_start_date: Option<NaiveDate>,
    ) -> Patient {
        let now = Utc::now();
        let patient = Patient {
            id: Uuid::new_v4(),
            therapist_id: self.therapist.id,
            name: name.to_string(),
            email: email.map(str::to_string),
            phone: None,
            session_price,
            therapy_start_date: None,
            billing_start_date,
            created_at: now,
            updated_at: now,
        };
        self.store.add_patient(patient.clone()).await;
        patient
    }
}

pub fn timed_event(id: &str, status: &str, start: &str, creator: &str) -> GoogleCalendarEvent {
    GoogleCalendarEvent {
        id: id.to_string(),
        status: Some(status.to_string()),
        start: Some(EventDateTime {
            date_time: Some(start.to_string()),
            ..Default::default()
        }),
        creator: Some(EventPerson {
            email: Some(creator.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn with_summary(mut event: GoogleCalendarEvent, summary: &str) -> GoogleCalendarEvent {
    event.summary = Some(summary.to_string());
    event
}

pub fn with_attendees(mut event: GoogleCalendarEvent, emails: &[&str]) -> GoogleCalendarEvent {
    event.attendees = emails
        .iter()
        .map(|email| EventAttendee {
            email: Some(email.to_string()),
            response_status: Some("accepted".to_string()),
            ..Default::default()
        })
        .collect();
    event
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}
