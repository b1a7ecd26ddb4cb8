use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub google_calendar_api_base_url: String,
    pub google_oauth_token_url: String,
    pub google_service_account_email: String,
    pub google_service_account_private_key: String,
    pub google_delegated_user: Option<String>,
    pub webhook_url: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("DATABASE_URL not set, using empty value");
                    String::new()
                }),
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("JWT_SECRET not set, using empty value");
                    String::new()
                }),
            google_calendar_api_base_url: env::var("GOOGLE_CALENDAR_API_BASE_URL")
                .unwrap_or_else(|_| "https://www.googleapis.com/calendar/v3".to_string()),
            google_oauth_token_url: env::var("GOOGLE_OAUTH_TOKEN_URL")
                .unwrap_or_else(|_| "https://oauth2.googleapis.com/token".to_string()),
            google_service_account_email: env::var("GOOGLE_SERVICE_ACCOUNT_EMAIL")
                .unwrap_or_else(|_| {
                    warn!("GOOGLE_SERVICE_ACCOUNT_EMAIL not set, using empty value");
                    String::new()
                }),
            // Keys pasted into .env files usually carry literal "\n" sequences
            google_service_account_private_key: env::var("GOOGLE_SERVICE_ACCOUNT_PRIVATE_KEY")
                .map(|key| key.replace("\\n", "\n"))
                .unwrap_or_else(|_| {
                    warn!("GOOGLE_SERVICE_ACCOUNT_PRIVATE_KEY not set, using empty value");
                    String::new()
                }),
            google_delegated_user: env::var("GOOGLE_DELEGATED_USER")
                .ok()
                .filter(|v| !v.is_empty()),
            webhook_url: env::var("WEBHOOK_URL")
                .unwrap_or_else(|_| {
                    warn!("WEBHOOK_URL not set, calendar watch channels cannot be created");
                    String::new()
                }),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.database_url.is_empty() && !self.jwt_secret.is_empty()
    }

    pub fn is_google_configured(&self) -> bool {
        !self.google_service_account_email.is_empty()
            && !self.google_service_account_private_key.is_empty()
            && !self.google_oauth_token_url.is_empty()
    }

    pub fn is_webhook_configured(&self) -> bool {
        !self.webhook_url.is_empty()
    }
}
