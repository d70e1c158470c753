//! Per-scope connection binding.
//!
//! A [`TransactionContext`] is the explicit stand-in for the thread-bound
//! connection registry found in classic data-access stacks: each logical
//! call chain carries one context value, the manager binds the
//! transaction's connection into it, and repositories look the
//! connection up instead of taking it as a parameter. Two contexts never
//! observe each other's binding, so concurrent transactions isolate by
//! construction.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::store::{BoxedConnection, Statement, StatementResult, StoreError, StoreResult};
use crate::transaction::error::{TransactionError, TransactionResult};

/// An acquired physical connection plus the autocommit value to restore
/// on release.
///
/// The connection lives in an `Option`: detaching it for release is a
/// `take`, so it can leave the handle exactly once. Statements executed
/// against a detached handle fail with
/// [`StoreError::ConnectionReleased`].
#[derive(Debug)]
pub struct ConnectionHandle {
    conn: Option<BoxedConnection>,
    prior_auto_commit: bool,
}

impl ConnectionHandle {
    pub(crate) fn new(conn: BoxedConnection, prior_auto_commit: bool) -> Self {
        Self {
            conn: Some(conn),
            prior_auto_commit,
        }
    }

    /// The autocommit value the connection had before the transaction.
    pub fn prior_auto_commit(&self) -> bool {
        self.prior_auto_commit
    }

    /// Execute a statement on the bound connection.
    pub fn execute(&mut self, stmt: Statement) -> StoreResult<StatementResult> {
        self.conn_mut()?.execute(stmt)
    }

    pub(crate) fn commit(&mut self) -> StoreResult<()> {
        self.conn_mut()?.commit()
    }

    pub(crate) fn rollback(&mut self) -> StoreResult<()> {
        self.conn_mut()?.rollback()
    }

    /// Take the connection out of the handle. Subsequent calls return
    /// `None`, which is what guarantees a single release.
    pub(crate) fn detach(&mut self) -> Option<BoxedConnection> {
        self.conn.take()
    }

    fn conn_mut(&mut self) -> StoreResult<&mut BoxedConnection> {
        self.conn.as_mut().ok_or(StoreError::ConnectionReleased)
    }
}

/// A connection handle shared between the scope that owns its lifetime
/// and the repository calls that execute on it.
pub type SharedHandle = Arc<Mutex<ConnectionHandle>>;

#[derive(Debug)]
struct ContextInner {
    slot: Mutex<Option<SharedHandle>>,
}

/// Scope-keyed storage for the current transaction's connection.
///
/// Cheap to clone; clones share the same binding slot. Create one per
/// logical call chain and pass it to everything that participates in the
/// transaction.
#[derive(Clone, Debug)]
pub struct TransactionContext {
    inner: Arc<ContextInner>,
}

impl TransactionContext {
    /// Create an unbound context.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                slot: Mutex::new(None),
            }),
        }
    }

    /// Bind a connection handle to this context.
    ///
    /// Fails with [`TransactionError::AlreadyBound`] if a handle is
    /// already bound: beginning a second transaction on the same scope
    /// without ending the first is a usage error.
    pub fn bind(&self, handle: SharedHandle) -> TransactionResult<()> {
        let mut slot = self.inner.slot.lock();
        if slot.is_some() {
            return Err(TransactionError::AlreadyBound);
        }
        *slot = Some(handle);
        Ok(())
    }

    /// The handle bound to this context, if a transaction is active.
    pub fn current(&self) -> Option<SharedHandle> {
        self.inner.slot.lock().clone()
    }

    /// Whether a transaction is currently bound.
    pub fn is_bound(&self) -> bool {
        self.inner.slot.lock().is_some()
    }

    /// Remove the binding. Calling with nothing bound is a no-op, which
    /// keeps cleanup paths safe to run unconditionally.
    pub fn unbind(&self) {
        self.inner.slot.lock().take();
    }
}

impl Default for TransactionContext {
    fn default() -> Self {
        Self::new()
    }
}
