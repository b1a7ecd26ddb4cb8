pub mod applier;
pub mod import;
pub mod lifecycle;
pub mod matcher;
pub mod memory;
pub mod postgres;
pub mod sessions;
pub mod store;
pub mod sync;

pub use applier::ReconciliationApplier;
pub use import::{seed_payment_status, BulkImportService};
pub use lifecycle::SessionLifecycleService;
pub use matcher::{classify, SessionMatcher};
pub use memory::InMemorySessionStore;
pub use postgres::PgSessionStore;
pub use sessions::SessionService;
pub use store::{SessionStore, StoreTransaction};
pub use sync::CalendarSyncService;
