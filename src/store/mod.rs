//! Store layer - the driver seam and the embedded in-memory backend.
//!
//! Everything above this module talks to the store through two small
//! traits: [`ConnectionSource`] hands out and reclaims pooled
//! connections, and [`Connection`] executes statements and controls the
//! transaction mode of one physical connection. [`MemStore`] /
//! [`MemoryPool`] implement both in memory so the crate is exercisable
//! without an external database.

mod connection;
mod errors;
mod memory;
mod source;
mod statement;
mod types;

pub use connection::{BoxedConnection, Connection};
pub use errors::{AcquisitionError, StoreError, StoreResult};
pub use memory::{MemConnection, MemStore, MemoryPool, PoolConfig, PoolStats};
pub use source::ConnectionSource;
pub use statement::{Statement, StatementResult};
pub use types::{InvalidNameError, Row, RowKey, TableName};
