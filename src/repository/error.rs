//! Repository error types.

use thiserror::Error;

use crate::store::{AcquisitionError, StoreError};

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Errors raised by repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No row for the requested id. An expected, recoverable outcome,
    /// distinct from infrastructure failure.
    #[error("account not found: {0}")]
    NotFound(String),

    /// No connection available for an autonomous operation.
    #[error("connection acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    /// Statement execution failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl RepositoryError {
    /// Check if this error is an expected absence rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound(_))
    }
}
