//! Engine error taxonomy.
//!
//! Every workflow returns `Result<T, EngineError>`. Store-level failures are
//! classified on the way in so callers can tell a business refusal from a
//! transient fault without inspecting message text.

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Binding availability check failed: no slot, no room, or short stock.
    #[error("{0}")]
    CapacityExhausted(String),

    /// A domain rule was violated; the message is surfaced unchanged.
    #[error("{0}")]
    ValidationRejected(String),

    /// The operation needs a time window to elapse first.
    #[error("Test is processing. Time remaining: {}m {}s", .remaining_secs / 60, .remaining_secs % 60)]
    TemporalGuardViolation { remaining_secs: i64 },

    /// Connection or transaction fault unrelated to business rules.
    #[error("Store unavailable: {0}")]
    TransientStoreFailure(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CapacityExhausted(_) => "CAPACITY_EXHAUSTED",
            Self::ValidationRejected(_) => "VALIDATION_REJECTED",
            Self::TemporalGuardViolation { .. } => "NOT_YET_ELAPSED",
            Self::TransientStoreFailure(_) => "TRANSIENT_STORE_FAILURE",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Only transient store faults may be retried, and only as a whole unit.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStoreFailure(_))
    }

    pub(crate) fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::CannotOpen
                | ErrorCode::DiskFull
                | ErrorCode::OutOfMemory,
            ) => Self::TransientStoreFailure(err.to_string()),
            Some(ErrorCode::ConstraintViolation) => Self::ValidationRejected(err.to_string()),
            _ => Self::Internal(err.to_string()),
        }
    }
}

impl From<DatabaseError> for EngineError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Sqlite(inner) => inner.into(),
            DatabaseError::NotFound { entity_type, id } => Self::NotFound {
                entity: entity_type,
                id,
            },
            DatabaseError::ConstraintViolation(msg) => Self::ValidationRejected(msg),
            io @ DatabaseError::Io { .. } => Self::TransientStoreFailure(io.to_string()),
            other @ (DatabaseError::InvalidEnum { .. }
            | DatabaseError::InvalidValue { .. }
            | DatabaseError::MigrationFailed { .. }) => Self::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("Serialization failed: {err}"))
    }
}
