//! Parameterized statements and their results.
//!
//! Statements are typed values rather than SQL text: the operations this
//! layer needs are keyed single-row reads and writes, and a typed
//! statement keeps the execution seam opaque without dragging in a
//! parser.

use crate::store::types::{Row, RowKey, TableName};

/// A single parameterized statement against one table.
#[derive(Debug, Clone)]
pub enum Statement {
    /// Insert a new row; fails if the key exists.
    Insert { table: TableName, row: Row },
    /// Read one row by primary key.
    SelectByKey { table: TableName, key: RowKey },
    /// Replace one row's data by primary key.
    UpdateByKey {
        table: TableName,
        key: RowKey,
        row: Row,
    },
    /// Delete one row by primary key.
    DeleteByKey { table: TableName, key: RowKey },
}

impl Statement {
    /// The table this statement targets.
    pub fn table(&self) -> &TableName {
        match self {
            Statement::Insert { table, .. }
            | Statement::SelectByKey { table, .. }
            | Statement::UpdateByKey { table, .. }
            | Statement::DeleteByKey { table, .. } => table,
        }
    }

    /// Short operation name, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Insert { .. } => "insert",
            Statement::SelectByKey { .. } => "select",
            Statement::UpdateByKey { .. } => "update",
            Statement::DeleteByKey { .. } => "delete",
        }
    }
}

/// Result of executing a statement.
#[derive(Debug)]
pub enum StatementResult {
    /// Rows returned by a select.
    Rows(Vec<Row>),
    /// Number of rows affected by a write.
    Affected(u64),
}

impl StatementResult {
    /// Affected row count; for selects, the number of rows returned.
    pub fn affected(&self) -> u64 {
        match self {
            StatementResult::Rows(rows) => rows.len() as u64,
            StatementResult::Affected(n) => *n,
        }
    }

    /// Returned rows; empty for write statements.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            StatementResult::Rows(rows) => rows,
            StatementResult::Affected(_) => Vec::new(),
        }
    }
}
