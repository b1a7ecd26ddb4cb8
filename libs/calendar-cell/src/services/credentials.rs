// libs/calendar-cell/src/services/credentials.rs
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use shared_config::AppConfig;
use shared_utils::Clock;

use crate::models::{CalendarError, TokenResponse};

pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";
const ASSERTION_LIFETIME_SECONDS: i64 = 3600;
const REFRESH_MARGIN_SECONDS: i64 = 60;

/// A validated access token and the instant it stops being usable.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl IssuedToken {
    /// Validate a token endpoint response. A response without a non-empty
    /// `access_token` or a positive `expires_in` is rejected outright.
    pub fn from_response(response: TokenResponse, issued_at: DateTime<Utc>) -> Result<Self, CalendarError> {
        let access_token = response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CalendarError::InvalidTokenResponse("missing access_token".to_string()))?;

        if let Some(token_type) = response.token_type.as_deref() {
            if !token_type.eq_ignore_ascii_case("bearer") {
                return Err(CalendarError::InvalidTokenResponse(format!(
                    "unexpected token_type {}",
                    token_type
                )));
            }
        }

        let expires_in = response
            .expires_in
            .filter(|s| *s > 0)
            .ok_or_else(|| CalendarError::InvalidTokenResponse("missing expires_in".to_string()))?;

        Ok(Self {
            access_token,
            expires_at: issued_at + Duration::seconds(expires_in),
        })
    }
}

/// Holds one access token and refreshes it shortly before expiry. Concurrent
/// callers wait on the same refresh instead of each fetching a token.
pub struct AccessTokenCache {
    clock: Arc<dyn Clock>,
    refresh_margin: Duration,
    cached: Mutex<Option<IssuedToken>>,
}

impl AccessTokenCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            refresh_margin: Duration::seconds(REFRESH_MARGIN_SECONDS),
            cached: Mutex::new(None),
        }
    }

    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> Result<String, CalendarError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<IssuedToken, CalendarError>>,
    {
        let mut cached = self.cached.lock().await;
        let now = self.clock.now();

        if let Some(token) = cached.as_ref() {
            if token.expires_at - self.refresh_margin > now {
                return Ok(token.access_token.clone());
            }
            debug!("Cached access token expires at {}, refreshing", token.expires_at);
        }

        let token = refresh().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<&'a str>,
}

/// Service account identity used to mint JWT-bearer assertions.
pub struct ServiceAccountKey {
    client_email: String,
    delegated_user: Option<String>,
    encoding_key: EncodingKey,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("delegated_user", &self.delegated_user)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn from_config(config: &AppConfig) -> Result<Self, CalendarError> {
        if !config.is_google_configured() {
            return Err(CalendarError::NotConfigured);
        }

        let encoding_key = EncodingKey::from_rsa_pem(config.google_service_account_private_key.as_bytes())
            .map_err(|e| CalendarError::Credentials(format!("invalid service account key: {}", e)))?;

        Ok(Self {
            client_email: config.google_service_account_email.clone(),
            delegated_user: config.google_delegated_user.clone(),
            encoding_key,
        })
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// Signed assertion exchanged at the token endpoint for an access token.
    pub fn assertion(&self, token_url: &str, now: DateTime<Utc>) -> Result<String, CalendarError> {
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: CALENDAR_SCOPE,
            aud: token_url,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECONDS,
            sub: self.delegated_user.as_deref(),
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| CalendarError::Credentials(format!("failed to sign assertion: {}", e)))
    }
}
