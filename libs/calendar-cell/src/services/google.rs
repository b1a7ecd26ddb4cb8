// libs/calendar-cell/src/services/google.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, instrument};

use shared_config::AppConfig;
use shared_utils::Clock;

use crate::models::{
    CalendarAccess, CalendarError, EventsListResponse, GoogleCalendarEvent, StopChannelRequest,
    TokenResponse, WatchChannel, WatchRequest, WatchResponse,
};
use crate::services::credentials::{AccessTokenCache, IssuedToken, ServiceAccountKey};

const PAGE_SIZE: u32 = 250;
const MAX_PAGES: usize = 40;

/// Calendar provider operations the sync pipeline depends on.
#[async_trait]
pub trait CalendarClient: Send + Sync {
    /// All (expanded, single-instance) events starting in `[time_min, time_max)`.
    async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        access: &CalendarAccess,
    ) -> Result<Vec<GoogleCalendarEvent>, CalendarError>;

    /// Events changed since `updated_min`, deleted ones included, in update order.
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

/// Google Calendar v3 REST client.
/// Based on: https://developers.google.com/calendar/api/v3/reference
pub struct GoogleCalendarClient {
    client: Client,
    base_url: String,
    token_url: String,
    service_account: Option<ServiceAccountKey>,
    token_cache: AccessTokenCache,
    clock: Arc<dyn Clock>,
}

impl GoogleCalendarClient {
    /// Build the client. A missing or unreadable service account key is not
    /// fatal: calls made with `CalendarAccess::UserToken` still work, while
    /// service-account calls fail with `NotConfigured`.
    pub fn new(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let service_account = match ServiceAccountKey::from_config(config) {
            Ok(key) => {
                info!("Google Calendar service account: {}", key.client_email());
                Some(key)
            }
            Err(e) => {
                tracing::warn!("Google service account unavailable: {}", e);
                None
            }
        };

        Self {
            client: Client::new(),
            base_url: config.google_calendar_api_base_url.trim_end_matches('/').to_string(),
            token_url: config.google_oauth_token_url.clone(),
            service_account,
            token_cache: AccessTokenCache::new(clock.clone()),
            clock,
        }
    }

    pub fn has_service_account(&self) -> bool {
        self.service_account.is_some()
    }

    async fn access_token(&self, access: &CalendarAccess) -> Result<String, CalendarError> {
        match access {
            CalendarAccess::UserToken(token) if token.is_empty() => Err(CalendarError::ValidationError(
                "user access token is empty".to_string(),
            )),
            CalendarAccess::UserToken(token) => Ok(token.clone()),
            CalendarAccess::ServiceAccount => {
                self.token_cache
                    .get_or_refresh(|| self.fetch_service_account_token())
                    .await
            }
        }
    }

    async fn fetch_service_account_token(&self) -> Result<IssuedToken, CalendarError> {
        let key = self.service_account.as_ref().ok_or(CalendarError::NotConfigured)?;
        let now = self.clock.now();
        let assertion = key.assertion(&self.token_url, now)?;

        debug!("Requesting service account token from {}", self.token_url);

        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        let token_response: TokenResponse = read_json(response, "token request").await?;
        IssuedToken::from_response(token_response, now)
    }

    fn calendar_url(&self, calendar_id: &str, suffix: &str) -> String {
        format!(
            "{}/calendars/{}{}",
            self.base_url,
            urlencoding::encode(calendar_id),
            suffix
        )
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        access: &CalendarAccess,
        operation: &str,
    ) -> Result<T, CalendarError> {
        let token = self.access_token(access).await?;
        let response = request.bearer_auth(token).send().await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            && *access == CalendarAccess::ServiceAccount
        {
            self.token_cache.invalidate().await;
        }

        read_json(response, operation).await
    }

    async fn list_pages(
        &self,
        calendar_id: &str,
        params: Vec<(&'static str, String)>,
        access: &CalendarAccess,
    ) -> Result<Vec<GoogleCalendarEvent>, CalendarError> {
        let url = self.calendar_url(calendar_id, "/events");
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut query = params.clone();
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }

            let page: EventsListResponse = self
                .send_json(self.client.get(&url).query(&query), access, "events.list")
                .await?;

            events.extend(page.items);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(events),
            }
        }

        error!("events.list for {} exceeded {} pages", calendar_id, MAX_PAGES);
        Err(CalendarError::InvalidResponse(format!(
            "more than {} pages of events",
            MAX_PAGES
        )))
    }
}

#[async_trait]
impl CalendarClient for GoogleCalendarClient {
    #[instrument(skip(self, access))]
    async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        access: &CalendarAccess,
    ) -> Result<Vec<GoogleCalendarEvent>, CalendarError> {
        if time_max <= time_min {
            return Err(CalendarError::ValidationError(
                "end must be after start".to_string(),
            ));
        }

        let params = vec![
            ("timeMin", time_min.to_rfc3339()),
            ("timeMax", time_max.to_rfc3339()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
            ("maxResults", PAGE_SIZE.to_string()),
        ];

        let events = self.list_pages(calendar_id, params, access).await?;
        info!("Fetched {} events from calendar {}", events.len(), calendar_id);
        Ok(events)
    }

    #[instrument(skip(self))]
    async fn recently_updated_events(
        &self,
        calendar_id: &str,
        updated_min: DateTime<Utc>,
        max_results: u32,
    ) -> Result<Vec<GoogleCalendarEvent>, CalendarError> {
        let params = vec![
            ("updatedMin", updated_min.to_rfc3339()),
            ("showDeleted", "true".to_string()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "updated".to_string()),
            ("maxResults", max_results.clamp(1, PAGE_SIZE).to_string()),
        ];

        self.list_pages(calendar_id, params, &CalendarAccess::ServiceAccount)
            .await
    }

    #[instrument(skip(self))]
    async fn watch_calendar(
        &self,
        calendar_id: &str,
        channel_id: &str,
        webhook_url: &str,
    ) -> Result<WatchChannel, CalendarError> {
        let body = WatchRequest {
            id: channel_id.to_string(),
            channel_type: "web_hook".to_string(),
            address: webhook_url.to_string(),
        };

        let response: WatchResponse = self
            .send_json(
                self.client.post(self.calendar_url(calendar_id, "/events/watch")).json(&body),
                &CalendarAccess::ServiceAccount,
                "events.watch",
            )
            .await?;

        let expiration = response
            .expiration
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());

        info!("Watch channel {} created for calendar {}", response.id, calendar_id);

        Ok(WatchChannel {
            channel_id: response.id,
            resource_id: response.resource_id,
            calendar_id: calendar_id.to_string(),
            expiration,
        })
    }

    #[instrument(skip(self))]
    async fn stop_channel(&self, channel_id: &str, resource_id: &str) -> Result<(), CalendarError> {
        let token = self.access_token(&CalendarAccess::ServiceAccount).await?;
        let body = StopChannelRequest {
            id: channel_id.to_string(),
            resource_id: resource_id.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/channels/stop", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("channels.stop failed: {} - {}", status, text);
            return Err(CalendarError::UpstreamUnavailable {
                message: format!("HTTP {}: {}", status, text),
            });
        }

        info!("Watch channel {} stopped", channel_id);
        Ok(())
    }
}

async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    operation: &str,
) -> Result<T, CalendarError> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        error!("Google {} failed: {} - {}", operation, status, text);
        return Err(CalendarError::UpstreamUnavailable {
            message: format!("HTTP {}: {}", status, text),
        });
    }

    serde_json::from_str(&text).map_err(|e| {
        CalendarError::InvalidResponse(format!("failed to parse {} response: {}", operation, e))
    })
}
