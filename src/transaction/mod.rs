//! Transaction propagation for pooled connections.
//!
//! One logical transaction owns one physical connection. The manager
//! binds that connection into the caller's context at begin; every
//! repository call issued with the same context finds and reuses it, and
//! the terminal call (commit or rollback) restores the connection's
//! autocommit mode, returns it to the pool exactly once and unbinds it.
//!
//! # Architecture
//!
//! ```text
//!  Service / TransactionBoundary
//!        │ begin / commit / rollback
//!        ▼
//!  ┌────────────────────┐   bind / unbind   ┌────────────────────┐
//!  │ TransactionManager │ ────────────────► │ TransactionContext │
//!  └────────────────────┘                   └────────────────────┘
//!        │ acquire / release                        ▲ current()
//!        ▼                                          │
//!  ┌────────────────────┐                   ┌────────────────────┐
//!  │  ConnectionSource  │                   │    Repositories    │
//!  └────────────────────┘                   └────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let manager = TransactionManager::new(pool);
//! let ctx = TransactionContext::new();
//!
//! let mut scope = manager.begin(&ctx)?;
//! match do_work(&ctx) {
//!     Ok(()) => manager.commit(&mut scope)?,
//!     Err(err) => {
//!         manager.rollback(&mut scope)?;
//!         return Err(err);
//!     }
//! }
//! ```

mod boundary;
mod context;
mod error;
mod manager;

pub use boundary::TransactionBoundary;
pub use context::{ConnectionHandle, SharedHandle, TransactionContext};
pub use error::{TransactionError, TransactionResult};
pub use manager::{
    ScopeMetadata, ScopeState, TransactionConfig, TransactionManager, TransactionScope,
};
