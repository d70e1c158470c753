//! Declarative transaction wrapping.
//!
//! [`TransactionBoundary`] is the functional replacement for proxy-based
//! transaction annotations: it wraps any operation in
//! begin/commit-or-rollback using exactly the manager's contract, so
//! business code keeps no transaction plumbing of its own.

use tracing::error;

use crate::transaction::context::TransactionContext;
use crate::transaction::error::TransactionError;
use crate::transaction::manager::{TransactionConfig, TransactionManager};

/// Wraps operations in a transaction.
pub struct TransactionBoundary {
    manager: TransactionManager,
}

impl TransactionBoundary {
    /// Create a boundary over the given manager.
    pub fn new(manager: TransactionManager) -> Self {
        Self { manager }
    }

    /// Run `op` inside a transaction on `ctx`.
    ///
    /// Commits if `op` returns `Ok`, rolls back if it returns `Err` and
    /// re-surfaces the operation's own error. A rollback failure is
    /// logged rather than allowed to mask that error; a commit failure
    /// after a successful operation surfaces as the boundary's result.
    pub fn execute<F, T, E>(&self, ctx: &TransactionContext, op: F) -> Result<T, E>
    where
        F: FnOnce(&TransactionContext) -> Result<T, E>,
        E: From<TransactionError>,
    {
        self.execute_with_config(ctx, TransactionConfig::default(), op)
    }

    /// Like [`execute`](Self::execute), with explicit transaction options.
    pub fn execute_with_config<F, T, E>(
        &self,
        ctx: &TransactionContext,
        config: TransactionConfig,
        op: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&TransactionContext) -> Result<T, E>,
        E: From<TransactionError>,
    {
        let mut scope = self.manager.begin_with_config(ctx, config)?;

        match op(ctx) {
            Ok(value) => {
                self.manager.commit(&mut scope)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.manager.rollback(&mut scope) {
                    error!(
                        scope_id = %scope.id(),
                        error = %rollback_err,
                        "rollback failed after operation error"
                    );
                }
                Err(err)
            }
        }
    }
}
