//! Store layer error types.
//!
//! Acquisition failures (the pool cannot supply a connection) are kept
//! apart from statement failures: the former mean the operation never
//! started, the latter mean the store rejected or lost a statement.

use thiserror::Error;

use crate::store::types::{InvalidNameError, RowKey, TableName};

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// The pool could not supply a connection.
#[derive(Debug, Clone, Error)]
pub enum AcquisitionError {
    /// All connections are checked out.
    #[error("connection pool exhausted: {in_use}/{max} connections in use")]
    Exhausted { in_use: usize, max: usize },

    /// The source has been shut down.
    #[error("connection source is closed")]
    Closed,
}

/// Errors raised by statement execution on a connection.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert with a primary key that already exists.
    #[error("row already exists: table={table}, key={key}")]
    RowAlreadyExists { table: TableName, key: RowKey },

    /// A stored row does not decode to the expected shape.
    #[error("corrupted row at {table}/{key}: {reason}")]
    CorruptedRow {
        table: TableName,
        key: RowKey,
        reason: String,
    },

    /// Invalid table or key name.
    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The connection was already returned to its pool.
    #[error("connection has been released back to its pool")]
    ConnectionReleased,

    /// Failure reported by the backing store.
    #[error("backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Check if this error is a primary-key conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::RowAlreadyExists { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let conflict = StoreError::RowAlreadyExists {
            table: TableName::new("account").unwrap(),
            key: RowKey::new("acc1").unwrap(),
        };
        assert!(conflict.is_conflict());
        assert!(!StoreError::ConnectionReleased.is_conflict());
    }

    #[test]
    fn test_acquisition_display() {
        let err = AcquisitionError::Exhausted { in_use: 4, max: 4 };
        assert_eq!(
            err.to_string(),
            "connection pool exhausted: 4/4 connections in use"
        );
    }
}
