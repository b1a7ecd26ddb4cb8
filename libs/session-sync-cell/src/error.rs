use thiserror::Error;

use calendar_cell::CalendarError;
use shared_models::error::AppError;

use crate::models::SessionStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound(err.to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::ConstraintViolation(db.message().to_string())
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Calendar(#[from] CalendarError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: SessionStatus, to: SessionStatus },
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Store(StoreError::NotFound(msg)) | SyncError::NotFound(msg) => AppError::NotFound(msg),
            SyncError::Store(StoreError::ConstraintViolation(msg)) => AppError::Conflict(msg),
            SyncError::Store(StoreError::Database(msg)) => AppError::Database(msg),
            SyncError::Calendar(e) => calendar_cell::handlers::calendar_error_to_app("Calendar request failed", e),
            SyncError::ValidationError(msg) => AppError::ValidationError(msg),
            e @ SyncError::InvalidStatusTransition { .. } => AppError::Conflict(e.to_string()),
        }
    }
}
