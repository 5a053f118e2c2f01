use crate::types::DbId;

/// Domain error taxonomy shared by every crate in the workspace.
///
/// `Validation` and `Conflict` are surfaced to callers and never retried.
/// `Dispatch`, `Reconciliation` and `BackendCancel` describe compute-backend
/// failures; the orchestrator decides whether they are retried, logged or
/// turned into a terminal status.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    #[error("Status reconciliation failed: {0}")]
    Reconciliation(String),

    #[error("Remote cancellation failed: {0}")]
    BackendCancel(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
