pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::{StoreError, SyncError};
pub use models::*;
pub use router::{import_routes, session_routes, watch_routes, webhook_routes, SyncState};
pub use services::*;
