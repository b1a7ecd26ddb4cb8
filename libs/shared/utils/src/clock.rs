use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Source of "now". Injected where a domain decision depends on the current
/// time (Google access-token refresh, payment seeding, auto check-in) so tests
/// can pin it. API bearer tokens are checked against the wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}
