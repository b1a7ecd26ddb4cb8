pub mod credentials;
pub mod google;
pub mod normalizer;

pub use credentials::{AccessTokenCache, IssuedToken, ServiceAccountKey};
pub use google::{CalendarClient, GoogleCalendarClient};
pub use normalizer::normalize_event;
