//! txledger - a pooled, transaction-scoped data-access layer
//!
//! This crate wires repository operations (read balance, debit, credit)
//! into atomic units of work against a keyed row store. One physical
//! connection backs one logical transaction; repositories find it through
//! an explicit [`transaction::TransactionContext`] instead of having it
//! threaded through every call signature, and the connection goes back to
//! its pool exactly once whether the transaction commits or rolls back.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use txledger::repository::{Account, AccountRepository};
//! use txledger::service::TransferService;
//! use txledger::store::{MemStore, MemoryPool, PoolConfig};
//! use txledger::transaction::{TransactionContext, TransactionManager};
//!
//! let pool = Arc::new(MemoryPool::new(MemStore::new(), PoolConfig::default()));
//! let accounts = AccountRepository::new(pool.clone());
//! let manager = TransactionManager::new(pool);
//! let service = TransferService::new(manager, accounts.clone());
//!
//! let ctx = TransactionContext::new();
//! accounts.insert(&ctx, &Account::new("alice", 10_000)).unwrap();
//! accounts.insert(&ctx, &Account::new("bob", 10_000)).unwrap();
//! service.transfer(&ctx, "alice", "bob", 2_000).unwrap();
//! ```

pub mod repository;
pub mod service;
pub mod store;
pub mod transaction;
