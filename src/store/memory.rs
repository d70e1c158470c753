//! In-memory store engine and connection pool.
//!
//! The engine keeps tables in a shared map. Each connection stages its
//! writes in a private overlay while autocommit is off and publishes
//! them atomically on commit; rollback discards the overlay. This gives
//! the same visibility rules a driver-backed connection would have,
//! which is all the layers above need.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::store::connection::{BoxedConnection, Connection};
use crate::store::errors::{AcquisitionError, StoreError, StoreResult};
use crate::store::source::ConnectionSource;
use crate::store::statement::{Statement, StatementResult};
use crate::store::types::{Row, RowKey, TableName};

type Tables = BTreeMap<TableName, BTreeMap<RowKey, Row>>;

/// Staged changes: key -> new row, or None for a staged delete.
type Overlay = BTreeMap<(TableName, RowKey), Option<Row>>;

/// The shared in-memory table map.
///
/// Cheap to clone; clones share the same tables. Missing tables read as
/// empty and are created on first write.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read_row(&self, table: &TableName, key: &RowKey) -> Option<Row> {
        self.tables
            .read()
            .get(table)
            .and_then(|rows| rows.get(key))
            .cloned()
    }

    /// Apply a batch of changes under one write lock.
    fn apply(&self, changes: Overlay) {
        let mut tables = self.tables.write();
        for ((table, key), change) in changes {
            match change {
                Some(row) => {
                    tables.entry(table).or_default().insert(key, row);
                }
                None => {
                    if let Some(rows) = tables.get_mut(&table) {
                        rows.remove(&key);
                    }
                }
            }
        }
    }
}

/// One-shot fault hook shared by a pool's connections.
#[derive(Debug, Default)]
struct FaultPlan {
    fail_next_commit: Mutex<Option<String>>,
}

/// A connection over a [`MemStore`].
#[derive(Debug)]
pub struct MemConnection {
    store: MemStore,
    auto_commit: bool,
    overlay: Overlay,
    faults: Arc<FaultPlan>,
}

impl MemConnection {
    fn new(store: MemStore, faults: Arc<FaultPlan>) -> Self {
        Self {
            store,
            auto_commit: true,
            overlay: Overlay::new(),
            faults,
        }
    }

    /// Read through the overlay: staged writes win over the base store.
    fn row_visible(&self, table: &TableName, key: &RowKey) -> Option<Row> {
        match self.overlay.get(&(table.clone(), key.clone())) {
            Some(staged) => staged.clone(),
            None => self.store.read_row(table, key),
        }
    }

    fn exists(&self, table: &TableName, key: &RowKey) -> bool {
        self.row_visible(table, key).is_some()
    }

    fn write(&mut self, table: TableName, key: RowKey, change: Option<Row>) {
        if self.auto_commit {
            let mut single = Overlay::new();
            single.insert((table, key), change);
            self.store.apply(single);
        } else {
            self.overlay.insert((table, key), change);
        }
    }
}

impl Connection for MemConnection {
    fn execute(&mut self, stmt: Statement) -> StoreResult<StatementResult> {
        match stmt {
            Statement::Insert { table, row } => {
                if self.exists(&table, row.key()) {
                    return Err(StoreError::RowAlreadyExists {
                        table,
                        key: row.key().clone(),
                    });
                }
                let key = row.key().clone();
                self.write(table, key, Some(row));
                Ok(StatementResult::Affected(1))
            }
            Statement::SelectByKey { table, key } => {
                let rows = self.row_visible(&table, &key).into_iter().collect();
                Ok(StatementResult::Rows(rows))
            }
            Statement::UpdateByKey { table, key, row } => {
                if !self.exists(&table, &key) {
                    return Ok(StatementResult::Affected(0));
                }
                self.write(table, key, Some(row));
                Ok(StatementResult::Affected(1))
            }
            Statement::DeleteByKey { table, key } => {
                if !self.exists(&table, &key) {
                    return Ok(StatementResult::Affected(0));
                }
                self.write(table, key, None);
                Ok(StatementResult::Affected(1))
            }
        }
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn set_auto_commit(&mut self, enabled: bool) -> StoreResult<()> {
        // Driver contract: re-enabling autocommit commits pending work.
        if enabled && !self.auto_commit && !self.overlay.is_empty() {
            self.commit()?;
        }
        self.auto_commit = enabled;
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        if let Some(reason) = self.faults.fail_next_commit.lock().take() {
            // A failed commit aborts the unit of work.
            self.overlay.clear();
            return Err(StoreError::Backend(reason));
        }
        let changes = std::mem::take(&mut self.overlay);
        self.store.apply(changes);
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        self.overlay.clear();
        Ok(())
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Hard limit on concurrently checked-out connections.
    pub max_connections: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_connections: 8 }
    }
}

impl PoolConfig {
    /// Create a configuration with the given connection limit.
    pub fn new(max_connections: usize) -> Self {
        Self { max_connections }
    }
}

/// Pool lifecycle counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    /// Connections currently checked out.
    pub in_use: usize,
    /// Total acquisitions since the pool was created.
    pub acquired_total: u64,
    /// Total releases since the pool was created.
    pub released_total: u64,
}

struct PoolInner {
    store: MemStore,
    config: PoolConfig,
    idle: Mutex<Vec<BoxedConnection>>,
    stats: Mutex<PoolStats>,
    faults: Arc<FaultPlan>,
}

/// Connection pool over a [`MemStore`].
///
/// Thread-safe: can be shared across threads via Clone (uses Arc
/// internally).
#[derive(Clone)]
pub struct MemoryPool {
    inner: Arc<PoolInner>,
}

impl MemoryPool {
    /// Create a pool over the given store.
    pub fn new(store: MemStore, config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                store,
                config,
                idle: Mutex::new(Vec::new()),
                stats: Mutex::new(PoolStats::default()),
                faults: Arc::new(FaultPlan::default()),
            }),
        }
    }

    /// A handle to the underlying store.
    pub fn store(&self) -> MemStore {
        self.inner.store.clone()
    }

    /// Current lifecycle counters.
    pub fn stats(&self) -> PoolStats {
        *self.inner.stats.lock()
    }

    /// Connections currently checked out.
    pub fn in_use(&self) -> usize {
        self.inner.stats.lock().in_use
    }

    /// Make the next commit on any of this pool's connections fail once.
    ///
    /// Lets callers exercise the path where the store accepts writes but
    /// cannot finish the transaction.
    pub fn inject_commit_failure(&self, reason: impl Into<String>) {
        *self.inner.faults.fail_next_commit.lock() = Some(reason.into());
    }
}

impl ConnectionSource for MemoryPool {
    fn acquire(&self) -> Result<BoxedConnection, AcquisitionError> {
        {
            let mut stats = self.inner.stats.lock();
            if stats.in_use >= self.inner.config.max_connections {
                return Err(AcquisitionError::Exhausted {
                    in_use: stats.in_use,
                    max: self.inner.config.max_connections,
                });
            }
            stats.in_use += 1;
            stats.acquired_total += 1;
        }

        let conn = self.inner.idle.lock().pop().unwrap_or_else(|| {
            Box::new(MemConnection::new(
                self.inner.store.clone(),
                self.inner.faults.clone(),
            ))
        });
        debug!(in_use = self.in_use(), "connection acquired");
        Ok(conn)
    }

    fn release(&self, mut conn: BoxedConnection) {
        if !conn.auto_commit() {
            // A connection must not go back to the pool in manual-commit
            // mode: the next borrower would inherit an open unit of work.
            warn!("connection released in manual-commit mode; repairing");
            let _ = conn.rollback();
            let _ = conn.set_auto_commit(true);
        }
        self.inner.idle.lock().push(conn);

        let mut stats = self.inner.stats.lock();
        stats.in_use = stats.in_use.saturating_sub(1);
        stats.released_total += 1;
        debug!(in_use = stats.in_use, "connection released");
    }
}
