//! Account model and repository.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::store::{
    ConnectionSource, Row, RowKey, Statement, StatementResult, StoreError, StoreResult, TableName,
};
use crate::transaction::TransactionContext;

/// A ledger account. Each read returns a fresh snapshot; balances are
/// only ever changed through repository operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account id, the primary key.
    pub id: String,
    /// Current balance, in minor units.
    pub balance: i64,
}

impl Account {
    /// Create an account value.
    pub fn new(id: impl Into<String>, balance: i64) -> Self {
        Self {
            id: id.into(),
            balance,
        }
    }

    fn to_row(&self) -> StoreResult<Row> {
        let key = RowKey::new(self.id.as_str())?;
        let mut data = BTreeMap::new();
        data.insert("balance".to_string(), Value::from(self.balance));
        Ok(Row::new(key, data))
    }

    fn from_row(table: &TableName, row: &Row) -> StoreResult<Self> {
        let balance = row
            .get("balance")
            .and_then(Value::as_i64)
            .ok_or_else(|| StoreError::CorruptedRow {
                table: table.clone(),
                key: row.key().clone(),
                reason: "missing or non-integer balance column".to_string(),
            })?;
        Ok(Self {
            id: row.key().to_string(),
            balance,
        })
    }
}

/// Data access for the `account` table.
///
/// Every operation takes the caller's [`TransactionContext`] and follows
/// one resolution rule: a bound connection is used as-is and never
/// released here (the enclosing scope owns it); with no binding, a
/// connection is borrowed from the source for exactly one statement.
#[derive(Clone)]
pub struct AccountRepository {
    source: Arc<dyn ConnectionSource>,
    table: TableName,
}

impl AccountRepository {
    /// Table backing this repository.
    pub const TABLE: &'static str = "account";

    /// Create a repository over the given connection source.
    pub fn new(source: Arc<dyn ConnectionSource>) -> Self {
        Self {
            source,
            table: TableName::new(Self::TABLE).expect("static table name is valid"),
        }
    }

    /// Load an account by id.
    ///
    /// Fails with [`RepositoryError::NotFound`] when no row matches.
    pub fn find_by_id(&self, ctx: &TransactionContext, id: &str) -> RepositoryResult<Account> {
        let key = RowKey::new(id).map_err(StoreError::from)?;
        let stmt = Statement::SelectByKey {
            table: self.table.clone(),
            key,
        };

        let rows = self.run(ctx, stmt)?.into_rows();
        match rows.into_iter().next() {
            Some(row) => Ok(Account::from_row(&self.table, &row)?),
            None => Err(RepositoryError::NotFound(id.to_string())),
        }
    }

    /// Set an account's balance, returning the affected row count.
    ///
    /// Zero means the id did not exist; whether that is an error is the
    /// caller's call.
    pub fn update_balance(
        &self,
        ctx: &TransactionContext,
        id: &str,
        balance: i64,
    ) -> RepositoryResult<u64> {
        let key = RowKey::new(id).map_err(StoreError::from)?;
        let row = Account::new(id, balance).to_row()?;
        let stmt = Statement::UpdateByKey {
            table: self.table.clone(),
            key,
            row,
        };

        let affected = self.run(ctx, stmt)?.affected();
        debug!(id, balance, affected, "balance update executed");
        Ok(affected)
    }

    /// Insert a new account.
    pub fn insert(&self, ctx: &TransactionContext, account: &Account) -> RepositoryResult<()> {
        let stmt = Statement::Insert {
            table: self.table.clone(),
            row: account.to_row()?,
        };
        self.run(ctx, stmt)?;
        Ok(())
    }

    /// Delete an account by id, returning the affected row count.
    pub fn delete(&self, ctx: &TransactionContext, id: &str) -> RepositoryResult<u64> {
        let key = RowKey::new(id).map_err(StoreError::from)?;
        let stmt = Statement::DeleteByKey {
            table: self.table.clone(),
            key,
        };

        let affected = self.run(ctx, stmt)?.affected();
        debug!(id, affected, "delete executed");
        Ok(affected)
    }

    /// Resolve a connection and execute one statement on it.
    fn run(&self, ctx: &TransactionContext, stmt: Statement) -> RepositoryResult<StatementResult> {
        match ctx.current() {
            Some(handle) => {
                debug!(kind = stmt.kind(), table = %stmt.table(), "executing on bound connection");
                Ok(handle.lock().execute(stmt)?)
            }
            None => {
                debug!(kind = stmt.kind(), table = %stmt.table(), "executing autonomously");
                let mut conn = self.source.acquire()?;
                let result = conn.execute(stmt);
                // Back to the pool before the result is inspected, so
                // failures release too.
                self.source.release(conn);
                Ok(result?)
            }
        }
    }
}
