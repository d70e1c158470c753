//! Transaction error types.

use thiserror::Error;

use crate::store::{AcquisitionError, StoreError};

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Errors that can occur during transaction operations.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// The pool could not supply a connection; nothing was bound.
    #[error("connection acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    /// The context already has a bound connection.
    #[error("a connection is already bound to this transaction context")]
    AlreadyBound,

    /// Commit or rollback on a scope that already reached a terminal state.
    #[error("scope {scope_id} is not active (state: {state}): cannot {operation}")]
    InvalidScopeState {
        scope_id: String,
        state: String,
        operation: &'static str,
    },

    /// The store rejected the commit; the connection was still released.
    #[error("commit failed on scope {scope_id}: {source}")]
    Commit {
        scope_id: String,
        #[source]
        source: StoreError,
    },

    /// The store rejected the rollback; the connection was still released.
    #[error("rollback failed on scope {scope_id}: {source}")]
    Rollback {
        scope_id: String,
        #[source]
        source: StoreError,
    },

    /// Store error outside the commit/rollback phase.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl TransactionError {
    /// Check if this error indicates misuse of the API rather than an
    /// infrastructure failure. Usage errors mean a broken invariant in
    /// the calling code and are not expected in correct operation.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            TransactionError::AlreadyBound | TransactionError::InvalidScopeState { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_error_classification() {
        assert!(TransactionError::AlreadyBound.is_usage_error());

        let not_active = TransactionError::InvalidScopeState {
            scope_id: "tx001".to_string(),
            state: "committed".to_string(),
            operation: "commit",
        };
        assert!(not_active.is_usage_error());

        let exhausted = TransactionError::Acquisition(AcquisitionError::Exhausted {
            in_use: 1,
            max: 1,
        });
        assert!(!exhausted.is_usage_error());
    }
}
