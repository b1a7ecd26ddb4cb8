// libs/session-sync-cell/src/services/sync.rs
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use calendar_cell::{normalize_event, CalendarAccess, CalendarClient, GoogleCalendarEvent};
use patient_cell::Therapist;
use shared_utils::Clock;

use crate::error::SyncError;
use crate::models::{
    ApplyOutcome, CalendarEventProcessingResult, CalendarEventType, EventProcessing,
    ProcessingError, StoredWatchChannel, WebhookNotification, WebhookOutcome,
};
use crate::services::applier::ReconciliationApplier;
use crate::services::matcher::SessionMatcher;
use crate::services::sessions::day_range;
use crate::services::store::SessionStore;

/// How far back a notification looks for changed events.
const RECENT_WINDOW_HOURS: i64 = 24;
const RECENT_MAX_RESULTS: u32 = 250;

/// Webhook-driven reconciliation and watch channel management.
pub struct CalendarSyncService {
    store: Arc<dyn SessionStore>,
    calendar: Arc<dyn CalendarClient>,
    clock: Arc<dyn Clock>,
    matcher: SessionMatcher,
    applier: ReconciliationApplier,
    webhook_url: Option<String>,
}

impl CalendarSyncService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        calendar: Arc<dyn CalendarClient>,
        clock: Arc<dyn Clock>,
        webhook_url: Option<String>,
    ) -> Self {
        Self {
            matcher: SessionMatcher::new(store.clone()),
            applier: ReconciliationApplier::new(store.clone()),
            store,
            calendar,
            clock,
            webhook_url: webhook_url.filter(|url| !url.is_empty()),
        }
    }

    /// Process one push notification: fetch the most recently updated event
    /// of the watched calendar and reconcile it.
    #[instrument(skip(self, notification), fields(channel_id = %notification.channel_id, state = %notification.resource_state))]
    pub async fn handle_notification(&self, notification: &WebhookNotification) -> Result<WebhookOutcome, SyncError> {
        if notification.resource_state != "exists" {
            debug!("Ignoring {} notification", notification.resource_state);
            return Ok(WebhookOutcome::Ignored {
                reason: format!("resource state {}", notification.resource_state),
            });
        }

        let Some(channel) = self.store.find_watch_channel(&notification.channel_id).await? else {
            warn!("Notification for unknown channel {}", notification.channel_id);
            return Ok(WebhookOutcome::Ignored {
                reason: "unknown channel".to_string(),
            });
        };

        let therapist = self.store.find_therapist_by_calendar(&channel.calendar_id).await?;

        let updated_min = self.clock.now() - Duration::hours(RECENT_WINDOW_HOURS);
        let events = self
            .calendar
            .recently_updated_events(&channel.calendar_id, updated_min, RECENT_MAX_RESULTS)
            .await?;

        let Some(event) = most_recent(events) else {
            debug!("No recently updated events in {}", channel.calendar_id);
            return Ok(WebhookOutcome::Ignored {
                reason: "no recently updated events".to_string(),
            });
        };

        let processing = self.process_event(&event, therapist.as_ref()).await?;
        Ok(WebhookOutcome::Processed(processing))
    }

    /// Normalize, match and apply a single raw event.
    pub async fn process_event(
        &self,
        raw: &GoogleCalendarEvent,
        therapist: Option<&Therapist>,
    ) -> Result<EventProcessing, SyncError> {
        let event = match normalize_event(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!("Event {} not processed: {}", raw.id, e);
                return Ok(EventProcessing {
                    event_id: raw.id.clone(),
                    result: CalendarEventProcessingResult::failed(
                        CalendarEventType::New,
                        None,
                        ProcessingError::InvalidDate,
                    ),
                    outcome: ApplyOutcome::Skipped {
                        reason: ProcessingError::InvalidDate.to_string(),
                    },
                });
            }
        };

        let result = self.matcher.match_event(&event, therapist).await?;
        let outcome = self.applier.apply(&result, &event).await?;

        Ok(EventProcessing {
            event_id: event.event_id,
            result,
            outcome,
        })
    }

    #[instrument(skip(self))]
    pub async fn create_watch(&self, therapist_id: Uuid) -> Result<StoredWatchChannel, SyncError> {
        let webhook_url = self
            .webhook_url
            .as_deref()
            .ok_or_else(|| SyncError::ValidationError("WEBHOOK_URL is not configured".to_string()))?;
        let calendar_id = self.therapist_calendar(therapist_id).await?;

        let channel_id = Uuid::new_v4().to_string();
        let watch = self
            .calendar
            .watch_calendar(&calendar_id, &channel_id, webhook_url)
            .await?;

        let stored = StoredWatchChannel {
            channel_id: watch.channel_id,
            resource_id: watch.resource_id,
            calendar_id: watch.calendar_id,
            therapist_id,
            expiration: watch.expiration,
        };

        let mut tx = self.store.begin().await?;
        tx.save_watch_channel(&stored).await?;
        tx.commit().await?;

        info!("Watching calendar {} on channel {}", stored.calendar_id, stored.channel_id);
        Ok(stored)
    }

    #[instrument(skip(self))]
    pub async fn stop_watch(&self, channel_id: &str) -> Result<(), SyncError> {
        let channel = self
            .store
            .find_watch_channel(channel_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("Watch channel {} not found", channel_id)))?;

        self.calendar
            .stop_channel(&channel.channel_id, &channel.resource_id)
            .await?;

        let mut tx = self.store.begin().await?;
        tx.delete_watch_channel(&channel.channel_id).await?;
        tx.commit().await?;

        info!("Stopped watch channel {}", channel_id);
        Ok(())
    }

    /// Events of the therapist's calendar in the date range (inclusive) that
    /// have no session yet. Cancelled events are left out.
    #[instrument(skip(self))]
    pub async fn calendar_only_events(
        &self,
        therapist_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<GoogleCalendarEvent>, SyncError> {
        let (from, to) = day_range(start, end)?;
        let calendar_id = self.therapist_calendar(therapist_id).await?;

        let events = self
            .calendar
            .list_events(&calendar_id, from, to, &CalendarAccess::ServiceAccount)
            .await?;

        let candidates: Vec<GoogleCalendarEvent> = events
            .into_iter()
            .filter(|raw| match normalize_event(raw) {
                Ok(event) => !event.is_cancelled(),
                Err(_) => false,
            })
            .collect();

        let ids: Vec<String> = candidates.iter().map(|e| e.id.clone()).collect();
        let known = self.store.existing_event_ids(&ids).await?;

        Ok(candidates
            .into_iter()
            .filter(|e| !known.contains(&e.id))
            .collect())
    }

    async fn therapist_calendar(&self, therapist_id: Uuid) -> Result<String, SyncError> {
        let therapist = self
            .store
            .find_therapist(therapist_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("Therapist {} not found", therapist_id)))?;

        therapist
            .google_calendar_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                SyncError::ValidationError(format!("Therapist {} has no Google calendar", therapist_id))
            })
    }
}

/// The event with the latest `updated` timestamp. Ties, and events without a
/// timestamp, fall back to the provider's order (later wins).
fn most_recent(events: Vec<GoogleCalendarEvent>) -> Option<GoogleCalendarEvent> {
    events
        .into_iter()
        .enumerate()
        .max_by_key(|(position, event)| (event.updated, *position))
        .map(|(_, event)| event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn event(id: &str, updated: Option<&str>) -> GoogleCalendarEvent {
        GoogleCalendarEvent {
            id: id.to_string(),
            updated: updated.map(|u| DateTime::parse_from_rfc3339(u).unwrap().with_timezone(&Utc)),
            ..Default::default()
        }
    }

    #[test]
    fn test_most_recent_uses_updated_timestamp() {
        let events = vec![
            event("a", Some("2025-03-01T10:00:00Z")),
            event("b", Some("2025-03-01T12:00:00.000Z")),
            event("c", Some("2025-03-01T11:00:00Z")),
        ];
        assert_eq!(most_recent(events).map(|e| e.id), Some("b".to_string()));
    }

    #[test]
    fn test_most_recent_falls_back_to_order() {
        let events = vec![event("a", None), event("b", None)];
        assert_eq!(most_recent(events).map(|e| e.id), Some("b".to_string()));
        assert_eq!(most_recent(vec![]), None);
    }
}
