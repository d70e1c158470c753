//! The connection seam.

use crate::store::errors::StoreResult;
use crate::store::statement::{Statement, StatementResult};

/// One physical connection to the store.
///
/// A connection starts in autocommit mode: each statement is atomic on
/// its own. Turning autocommit off opens a unit of work on the
/// connection; writes stay invisible to other connections until
/// [`commit`](Connection::commit), and [`rollback`](Connection::rollback)
/// discards them. Re-enabling autocommit while writes are pending
/// applies them, matching the usual driver contract.
pub trait Connection: Send + std::fmt::Debug {
    /// Execute one parameterized statement.
    fn execute(&mut self, stmt: Statement) -> StoreResult<StatementResult>;

    /// Current autocommit mode.
    fn auto_commit(&self) -> bool;

    /// Switch autocommit mode.
    fn set_auto_commit(&mut self, enabled: bool) -> StoreResult<()>;

    /// Commit pending writes.
    fn commit(&mut self) -> StoreResult<()>;

    /// Discard pending writes.
    fn rollback(&mut self) -> StoreResult<()>;
}

/// Boxed connection, as handed out by a [`ConnectionSource`].
///
/// [`ConnectionSource`]: crate::store::ConnectionSource
pub type BoxedConnection = Box<dyn Connection>;
