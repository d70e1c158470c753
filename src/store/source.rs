//! The pool seam.

use crate::store::connection::BoxedConnection;
use crate::store::errors::AcquisitionError;

/// Supplies physical connections and reclaims them.
///
/// Acquire and release are the only operations this layer needs from a
/// pool; waiting, validation and timeout policy are the source's own
/// business. Every acquired connection must be released exactly once.
pub trait ConnectionSource: Send + Sync {
    /// Check a connection out of the pool.
    fn acquire(&self) -> Result<BoxedConnection, AcquisitionError>;

    /// Return a connection to the pool.
    fn release(&self, conn: BoxedConnection);
}
