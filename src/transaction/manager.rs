//! Transaction manager - drives the scope lifecycle.
//!
//! The manager owns the begin/commit/rollback mechanics: acquire a
//! connection, switch it to manual commit, bind it into the caller's
//! context, and on either terminal call restore the connection's
//! autocommit value, hand it back to the pool exactly once, and unbind.
//! Which terminal call happens is the caller's decision; the manager
//! only executes the chosen outcome.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, warn};
use ulid::Ulid;

use crate::store::ConnectionSource;
use crate::transaction::context::{ConnectionHandle, SharedHandle, TransactionContext};
use crate::transaction::error::{TransactionError, TransactionResult};

/// Lifecycle state of a transaction scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    /// Between begin and a terminal call; operations may run.
    Active,
    /// Ended through the commit path.
    Committed,
    /// Ended through the rollback path.
    RolledBack,
}

impl fmt::Display for ScopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeState::Active => write!(f, "active"),
            ScopeState::Committed => write!(f, "committed"),
            ScopeState::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// Options for a new transaction.
#[derive(Debug, Clone, Default)]
pub struct TransactionConfig {
    /// Human-readable label carried in scope metadata and logs.
    pub label: Option<String>,
}

impl TransactionConfig {
    /// Attach a label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Metadata about an active scope, tracked by the manager.
#[derive(Debug, Clone)]
pub struct ScopeMetadata {
    /// Unique scope id.
    pub scope_id: String,
    /// Label from the begin config, if any.
    pub label: Option<String>,
    /// When the scope started.
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// A logical transaction: the span between begin and
/// commit-or-rollback.
///
/// Owns exactly one connection handle for its lifetime. The state
/// records which terminal path ended the scope; once terminal, the scope
/// is inert and any further commit/rollback fails with
/// [`TransactionError::InvalidScopeState`] — whether or not the store
/// acknowledged the terminal statement.
#[derive(Debug)]
pub struct TransactionScope {
    id: String,
    state: ScopeState,
    handle: SharedHandle,
    context: TransactionContext,
    started_at: chrono::DateTime<chrono::Utc>,
}

impl TransactionScope {
    /// The scope id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ScopeState {
        self.state
    }

    /// Whether the scope can still commit or roll back.
    pub fn is_active(&self) -> bool {
        self.state == ScopeState::Active
    }

    /// When the scope started.
    pub fn started_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.started_at
    }

    fn ensure_active(&self, operation: &'static str) -> TransactionResult<()> {
        if self.state != ScopeState::Active {
            return Err(TransactionError::InvalidScopeState {
                scope_id: self.id.clone(),
                state: self.state.to_string(),
                operation,
            });
        }
        Ok(())
    }
}

struct ManagerInner {
    source: Arc<dyn ConnectionSource>,
    /// Active scopes tracked by id.
    active: RwLock<HashMap<String, ScopeMetadata>>,
}

/// Transaction manager - coordinates scope lifecycles over one
/// connection source.
///
/// Thread-safe: can be shared across threads via Clone (uses Arc
/// internally).
#[derive(Clone)]
pub struct TransactionManager {
    inner: Arc<ManagerInner>,
}

impl TransactionManager {
    /// Create a manager over the given connection source.
    pub fn new(source: Arc<dyn ConnectionSource>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                source,
                active: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Begin a transaction with default options.
    pub fn begin(&self, ctx: &TransactionContext) -> TransactionResult<TransactionScope> {
        self.begin_with_config(ctx, TransactionConfig::default())
    }

    /// Begin a transaction: acquire a connection, switch it to manual
    /// commit and bind it into `ctx`.
    ///
    /// On an acquisition failure nothing was bound and nothing needs
    /// cleanup. If the context is already bound, the freshly acquired
    /// connection goes straight back to the pool before
    /// [`TransactionError::AlreadyBound`] surfaces.
    pub fn begin_with_config(
        &self,
        ctx: &TransactionContext,
        config: TransactionConfig,
    ) -> TransactionResult<TransactionScope> {
        let mut conn = self.inner.source.acquire()?;

        let prior = conn.auto_commit();
        if let Err(err) = conn.set_auto_commit(false) {
            self.inner.source.release(conn);
            return Err(TransactionError::Store(err));
        }

        let handle: SharedHandle = Arc::new(Mutex::new(ConnectionHandle::new(conn, prior)));
        if let Err(err) = ctx.bind(handle.clone()) {
            if let Some(mut conn) = handle.lock().detach() {
                let _ = conn.set_auto_commit(prior);
                self.inner.source.release(conn);
            }
            return Err(err);
        }

        let scope_id = Ulid::new().to_string().to_lowercase();
        let started_at = chrono::Utc::now();
        let metadata = ScopeMetadata {
            scope_id: scope_id.clone(),
            label: config.label.clone(),
            started_at,
        };
        self.inner
            .active
            .write()
            .insert(scope_id.clone(), metadata);
        debug!(scope_id = %scope_id, label = ?config.label, "transaction begun");

        Ok(TransactionScope {
            id: scope_id,
            state: ScopeState::Active,
            handle,
            context: ctx.clone(),
            started_at,
        })
    }

    /// Commit an active scope.
    ///
    /// The connection is restored and released and the context unbound
    /// whether or not the store accepts the commit; a rejected commit
    /// surfaces as [`TransactionError::Commit`] after that cleanup.
    pub fn commit(&self, scope: &mut TransactionScope) -> TransactionResult<()> {
        scope.ensure_active("commit")?;

        let result = scope.handle.lock().commit();
        self.finish(scope, ScopeState::Committed);

        match result {
            Ok(()) => {
                debug!(scope_id = %scope.id, "transaction committed");
                Ok(())
            }
            Err(source) => Err(TransactionError::Commit {
                scope_id: scope.id.clone(),
                source,
            }),
        }
    }

    /// Roll back an active scope.
    ///
    /// A rollback the store rejects is logged and surfaced as
    /// [`TransactionError::Rollback`], but never suppresses cleanup: the
    /// connection is released and the context unbound regardless.
    pub fn rollback(&self, scope: &mut TransactionScope) -> TransactionResult<()> {
        scope.ensure_active("rollback")?;

        let result = scope.handle.lock().rollback();
        self.finish(scope, ScopeState::RolledBack);

        match result {
            Ok(()) => {
                debug!(scope_id = %scope.id, "transaction rolled back");
                Ok(())
            }
            Err(source) => {
                error!(scope_id = %scope.id, error = %source, "rollback failed");
                Err(TransactionError::Rollback {
                    scope_id: scope.id.clone(),
                    source,
                })
            }
        }
    }

    /// Tear down a scope: restore autocommit, release the connection
    /// exactly once, unbind the context, record the terminal state.
    fn finish(&self, scope: &mut TransactionScope, terminal: ScopeState) {
        let detached = {
            let mut handle = scope.handle.lock();
            let prior = handle.prior_auto_commit();
            handle.detach().map(|conn| (conn, prior))
        };

        if let Some((mut conn, prior)) = detached {
            if let Err(err) = conn.set_auto_commit(prior) {
                warn!(scope_id = %scope.id, error = %err, "failed to restore autocommit before release");
            }
            self.inner.source.release(conn);
        }

        scope.context.unbind();
        scope.state = terminal;
        self.inner.active.write().remove(&scope.id);
    }

    /// Number of active scopes.
    pub fn active_count(&self) -> usize {
        self.inner.active.read().len()
    }

    /// Ids of all active scopes.
    pub fn active_scopes(&self) -> Vec<String> {
        self.inner.active.read().keys().cloned().collect()
    }

    /// Metadata for an active scope.
    pub fn scope_info(&self, scope_id: &str) -> Option<ScopeMetadata> {
        self.inner.active.read().get(scope_id).cloned()
    }
}

impl fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionManager")
            .field("active_count", &self.active_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::Value;

    use super::*;
    use crate::store::{
        MemStore, MemoryPool, PoolConfig, Row, RowKey, Statement, TableName,
    };

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("txledger=debug")
            .try_init();
    }

    fn setup() -> (MemoryPool, TransactionManager) {
        let pool = MemoryPool::new(MemStore::new(), PoolConfig::default());
        let manager = TransactionManager::new(Arc::new(pool.clone()));
        (pool, manager)
    }

    fn insert_stmt(key: &str) -> Statement {
        let mut data = BTreeMap::new();
        data.insert("balance".to_string(), Value::from(100));
        Statement::Insert {
            table: TableName::new("account").unwrap(),
            row: Row::new(RowKey::new(key).unwrap(), data),
        }
    }

    fn select_stmt(key: &str) -> Statement {
        Statement::SelectByKey {
            table: TableName::new("account").unwrap(),
            key: RowKey::new(key).unwrap(),
        }
    }

    #[test]
    fn test_begin_and_commit() {
        init_tracing();
        let (pool, manager) = setup();
        let ctx = TransactionContext::new();

        let mut scope = manager.begin(&ctx).unwrap();
        assert!(ctx.is_bound());
        assert!(scope.is_active());
        assert_eq!(manager.active_count(), 1);
        assert!(manager.scope_info(scope.id()).is_some());

        manager.commit(&mut scope).unwrap();
        assert_eq!(scope.state(), ScopeState::Committed);
        assert!(!ctx.is_bound());
        assert_eq!(manager.active_count(), 0);

        let stats = pool.stats();
        assert_eq!(stats.acquired_total, 1);
        assert_eq!(stats.released_total, 1);
        assert_eq!(stats.in_use, 0);
    }

    #[test]
    fn test_begin_and_rollback_discards_writes() {
        let (pool, manager) = setup();
        let ctx = TransactionContext::new();

        let mut scope = manager.begin(&ctx).unwrap();
        ctx.current()
            .unwrap()
            .lock()
            .execute(insert_stmt("acc1"))
            .unwrap();
        manager.rollback(&mut scope).unwrap();
        assert_eq!(scope.state(), ScopeState::RolledBack);
        assert!(!ctx.is_bound());

        // Nothing was published, and the connection went back once.
        let mut conn = pool.acquire().unwrap();
        assert!(conn.auto_commit());
        assert_eq!(conn.execute(select_stmt("acc1")).unwrap().affected(), 0);
        assert_eq!(pool.stats().released_total, 1);
    }

    #[test]
    fn test_commit_publishes_writes() {
        let (pool, manager) = setup();
        let ctx = TransactionContext::new();

        let mut scope = manager.begin(&ctx).unwrap();
        ctx.current()
            .unwrap()
            .lock()
            .execute(insert_stmt("acc1"))
            .unwrap();
        manager.commit(&mut scope).unwrap();

        let mut conn = pool.acquire().unwrap();
        assert_eq!(conn.execute(select_stmt("acc1")).unwrap().affected(), 1);
    }

    #[test]
    fn test_commit_twice_fails() {
        let (pool, manager) = setup();
        let ctx = TransactionContext::new();

        let mut scope = manager.begin(&ctx).unwrap();
        manager.commit(&mut scope).unwrap();

        let err = manager.commit(&mut scope).unwrap_err();
        assert!(matches!(err, TransactionError::InvalidScopeState { .. }));
        assert!(err.is_usage_error());

        // No further side effects: still exactly one release.
        assert_eq!(pool.stats().released_total, 1);
    }

    #[test]
    fn test_rollback_after_commit_fails() {
        let (pool, manager) = setup();
        let ctx = TransactionContext::new();

        let mut scope = manager.begin(&ctx).unwrap();
        manager.commit(&mut scope).unwrap();

        let err = manager.rollback(&mut scope).unwrap_err();
        assert!(matches!(err, TransactionError::InvalidScopeState { .. }));
        assert_eq!(pool.stats().released_total, 1);
    }

    #[test]
    fn test_begin_while_bound_releases_fresh_connection() {
        let (pool, manager) = setup();
        let ctx = TransactionContext::new();

        let mut scope = manager.begin(&ctx).unwrap();
        let err = manager.begin(&ctx).unwrap_err();
        assert!(matches!(err, TransactionError::AlreadyBound));

        // The second acquisition was handed straight back.
        let stats = pool.stats();
        assert_eq!(stats.acquired_total, 2);
        assert_eq!(stats.released_total, 1);
        assert_eq!(manager.active_count(), 1);

        manager.rollback(&mut scope).unwrap();
        assert_eq!(pool.stats().released_total, 2);
    }

    #[test]
    fn test_acquisition_failure_binds_nothing() {
        let pool = MemoryPool::new(MemStore::new(), PoolConfig::new(1));
        let manager = TransactionManager::new(Arc::new(pool.clone()));
        let _held = pool.acquire().unwrap();

        let ctx = TransactionContext::new();
        let err = manager.begin(&ctx).unwrap_err();
        assert!(matches!(err, TransactionError::Acquisition(_)));
        assert!(!ctx.is_bound());
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_commit_failure_still_releases_once() {
        init_tracing();
        let (pool, manager) = setup();
        let ctx = TransactionContext::new();

        let mut scope = manager.begin(&ctx).unwrap();
        ctx.current()
            .unwrap()
            .lock()
            .execute(insert_stmt("acc1"))
            .unwrap();

        pool.inject_commit_failure("store went away");
        let err = manager.commit(&mut scope).unwrap_err();
        assert!(matches!(err, TransactionError::Commit { .. }));

        // Cleanup ran despite the failure: unbound, released once, inert.
        assert!(!ctx.is_bound());
        let stats = pool.stats();
        assert_eq!(stats.released_total, 1);
        assert_eq!(stats.in_use, 0);
        let err = manager.rollback(&mut scope).unwrap_err();
        assert!(matches!(err, TransactionError::InvalidScopeState { .. }));
    }

    #[test]
    fn test_concurrent_scopes_use_separate_connections() {
        let (pool, manager) = setup();
        let ctx1 = TransactionContext::new();
        let ctx2 = TransactionContext::new();

        let mut scope1 = manager.begin(&ctx1).unwrap();
        let mut scope2 = manager
            .begin_with_config(&ctx2, TransactionConfig::default().with_label("second"))
            .unwrap();
        assert_eq!(manager.active_count(), 2);
        assert_eq!(pool.in_use(), 2);
        assert_eq!(
            manager.scope_info(scope2.id()).unwrap().label.as_deref(),
            Some("second")
        );

        // Writes on scope1 stay invisible to scope2 until commit.
        ctx1.current()
            .unwrap()
            .lock()
            .execute(insert_stmt("acc1"))
            .unwrap();
        assert_eq!(
            ctx2.current()
                .unwrap()
                .lock()
                .execute(select_stmt("acc1"))
                .unwrap()
                .affected(),
            0
        );

        manager.commit(&mut scope1).unwrap();
        manager.rollback(&mut scope2).unwrap();
        assert_eq!(manager.active_count(), 0);
        assert_eq!(pool.stats().released_total, 2);
    }
}
