use feedrun_core::error::CoreError;
use feedrun_core::types::DbId;

/// Errors raised by the repository adapters.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// A stored row could not be mapped onto the domain type.
    #[error("Corrupt {entity} record {id}: {reason}")]
    Corrupt {
        entity: &'static str,
        id: DbId,
        reason: String,
    },
}

impl From<DbError> for CoreError {
    fn from(err: DbError) -> Self {
        CoreError::Internal(err.to_string())
    }
}
