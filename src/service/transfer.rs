//! Money transfers as one atomic unit of work.
//!
//! The service drives the manager around a fixed sequence of repository
//! calls: read both accounts, debit, credit. Every error out of that
//! sequence — business validation included — rolls the scope back and is
//! re-surfaced to the caller, so a transfer either moves both balances
//! or neither.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, error};

use crate::repository::{Account, AccountRepository, RepositoryError};
use crate::transaction::{TransactionContext, TransactionError, TransactionManager};

/// Result type for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;

/// Errors raised by the transfer service.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A business rule rejected the transfer. Triggers rollback like any
    /// other failure.
    #[error("transfer rejected: {0}")]
    Validation(String),

    /// A repository step failed.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// The transaction machinery failed.
    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),
}

/// Business rules applied to a transfer.
///
/// The rejection conditions are policy, not code: recipients can be
/// denylisted and overdrafts allowed per deployment.
#[derive(Debug, Clone, Default)]
pub struct TransferPolicy {
    denied_recipients: HashSet<String>,
    allow_overdraft: bool,
}

impl TransferPolicy {
    /// Policy with no denied recipients and overdrafts disallowed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse transfers to the given account id.
    pub fn deny_recipient(mut self, id: impl Into<String>) -> Self {
        self.denied_recipients.insert(id.into());
        self
    }

    /// Allow the source account to go negative.
    pub fn allow_overdraft(mut self, allow: bool) -> Self {
        self.allow_overdraft = allow;
        self
    }

    fn check_recipient(&self, to: &Account) -> TransferResult<()> {
        if self.denied_recipients.contains(&to.id) {
            return Err(TransferError::Validation(format!(
                "recipient {} does not accept transfers",
                to.id
            )));
        }
        Ok(())
    }

    fn check_funds(&self, from: &Account, amount: i64) -> TransferResult<()> {
        if !self.allow_overdraft && from.balance < amount {
            return Err(TransferError::Validation(format!(
                "insufficient funds: account {} holds {}, transfer needs {}",
                from.id, from.balance, amount
            )));
        }
        Ok(())
    }
}

/// Orchestrates transfers between two accounts.
pub struct TransferService {
    manager: TransactionManager,
    accounts: AccountRepository,
    policy: TransferPolicy,
}

impl TransferService {
    /// Create a service with the default policy.
    pub fn new(manager: TransactionManager, accounts: AccountRepository) -> Self {
        Self::with_policy(manager, accounts, TransferPolicy::default())
    }

    /// Create a service with an explicit policy.
    pub fn with_policy(
        manager: TransactionManager,
        accounts: AccountRepository,
        policy: TransferPolicy,
    ) -> Self {
        Self {
            manager,
            accounts,
            policy,
        }
    }

    /// Move `amount` from one account to another, atomically.
    ///
    /// Begins a scope on `ctx`, runs the balance moves through the
    /// repository, and commits. Any error — validation, missing account,
    /// store failure — rolls the scope back and comes back to the
    /// caller; a rollback failure on that path is logged, never allowed
    /// to mask the original error.
    pub fn transfer(
        &self,
        ctx: &TransactionContext,
        from_id: &str,
        to_id: &str,
        amount: i64,
    ) -> TransferResult<()> {
        let mut scope = self.manager.begin(ctx)?;
        debug!(from_id, to_id, amount, scope_id = %scope.id(), "transfer started");

        match self.move_balances(ctx, from_id, to_id, amount) {
            Ok(()) => {
                self.manager.commit(&mut scope)?;
                debug!(from_id, to_id, amount, "transfer committed");
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = self.manager.rollback(&mut scope) {
                    error!(
                        scope_id = %scope.id(),
                        error = %rollback_err,
                        "rollback failed after transfer error"
                    );
                }
                Err(err)
            }
        }
    }

    fn move_balances(
        &self,
        ctx: &TransactionContext,
        from_id: &str,
        to_id: &str,
        amount: i64,
    ) -> TransferResult<()> {
        if amount <= 0 {
            return Err(TransferError::Validation(format!(
                "transfer amount must be positive, got {amount}"
            )));
        }
        if from_id == to_id {
            return Err(TransferError::Validation(
                "source and destination accounts must differ".to_string(),
            ));
        }

        let from = self.accounts.find_by_id(ctx, from_id)?;
        let to = self.accounts.find_by_id(ctx, to_id)?;

        self.policy.check_funds(&from, amount)?;
        let debited = from.balance.checked_sub(amount).ok_or_else(|| {
            TransferError::Validation("balance underflow on source account".to_string())
        })?;
        let credited = to.balance.checked_add(amount).ok_or_else(|| {
            TransferError::Validation("balance overflow on destination account".to_string())
        })?;

        self.debit(ctx, from_id, debited)?;
        // The recipient check runs between the two updates on purpose:
        // a rejection exercises rollback of the already-applied debit.
        self.policy.check_recipient(&to)?;
        self.credit(ctx, to_id, credited)?;
        Ok(())
    }

    fn debit(&self, ctx: &TransactionContext, id: &str, balance: i64) -> TransferResult<()> {
        self.apply_update(ctx, id, balance)
    }

    fn credit(&self, ctx: &TransactionContext, id: &str, balance: i64) -> TransferResult<()> {
        self.apply_update(ctx, id, balance)
    }

    fn apply_update(&self, ctx: &TransactionContext, id: &str, balance: i64) -> TransferResult<()> {
        let affected = self.accounts.update_balance(ctx, id, balance)?;
        if affected == 0 {
            // The account vanished between the read and the write.
            return Err(RepositoryError::NotFound(id.to_string()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::{MemStore, MemoryPool, PoolConfig};

    const A: &str = "memberA";
    const B: &str = "memberB";
    const EX: &str = "ex";

    struct Fixture {
        pool: MemoryPool,
        repo: AccountRepository,
        service: TransferService,
        ctx: TransactionContext,
    }

    fn setup() -> Fixture {
        let pool = MemoryPool::new(MemStore::new(), PoolConfig::default());
        let repo = AccountRepository::new(Arc::new(pool.clone()));
        let manager = TransactionManager::new(Arc::new(pool.clone()));
        let service = TransferService::with_policy(
            manager,
            repo.clone(),
            TransferPolicy::new().deny_recipient(EX),
        );
        Fixture {
            pool,
            repo,
            service,
            ctx: TransactionContext::new(),
        }
    }

    fn seed(fx: &Fixture, id: &str, balance: i64) {
        fx.repo.insert(&fx.ctx, &Account::new(id, balance)).unwrap();
    }

    fn balance(fx: &Fixture, id: &str) -> i64 {
        fx.repo.find_by_id(&fx.ctx, id).unwrap().balance
    }

    fn assert_all_returned(fx: &Fixture) {
        let stats = fx.pool.stats();
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.acquired_total, stats.released_total);
    }

    #[test]
    fn test_transfer_moves_both_balances() {
        let fx = setup();
        seed(&fx, A, 10_000);
        seed(&fx, B, 10_000);

        fx.service.transfer(&fx.ctx, A, B, 2_000).unwrap();

        assert_eq!(balance(&fx, A), 8_000);
        assert_eq!(balance(&fx, B), 12_000);
        assert!(!fx.ctx.is_bound());
        assert_all_returned(&fx);
    }

    #[test]
    fn test_denied_recipient_rolls_back_partial_debit() {
        let fx = setup();
        seed(&fx, A, 10_000);
        seed(&fx, EX, 10_000);

        let err = fx.service.transfer(&fx.ctx, A, EX, 2_000).unwrap_err();
        assert!(matches!(err, TransferError::Validation(_)));

        // The debit had been applied inside the scope; rollback undid it.
        assert_eq!(balance(&fx, A), 10_000);
        assert_eq!(balance(&fx, EX), 10_000);
        assert_all_returned(&fx);
    }

    #[test]
    fn test_missing_account_rolls_back() {
        let fx = setup();
        seed(&fx, A, 10_000);

        let err = fx.service.transfer(&fx.ctx, A, "ghost", 2_000).unwrap_err();
        assert!(matches!(
            err,
            TransferError::Repository(RepositoryError::NotFound(_))
        ));

        assert_eq!(balance(&fx, A), 10_000);
        assert!(!fx.ctx.is_bound());
        assert_all_returned(&fx);
    }

    #[test]
    fn test_commit_failure_surfaces_and_releases_once() {
        let fx = setup();
        seed(&fx, A, 10_000);
        seed(&fx, B, 10_000);

        fx.pool.inject_commit_failure("store went away");
        let err = fx.service.transfer(&fx.ctx, A, B, 2_000).unwrap_err();
        assert!(matches!(
            err,
            TransferError::Transaction(TransactionError::Commit { .. })
        ));

        // The failed commit aborted the unit of work; nothing moved and
        // the connection still went back exactly once.
        assert_eq!(balance(&fx, A), 10_000);
        assert_eq!(balance(&fx, B), 10_000);
        assert!(!fx.ctx.is_bound());
        assert_all_returned(&fx);
    }

    #[test]
    fn test_insufficient_funds_rejected_before_any_write() {
        let fx = setup();
        seed(&fx, A, 1_000);
        seed(&fx, B, 10_000);

        let err = fx.service.transfer(&fx.ctx, A, B, 2_000).unwrap_err();
        assert!(matches!(err, TransferError::Validation(_)));
        assert_eq!(balance(&fx, A), 1_000);
        assert_eq!(balance(&fx, B), 10_000);
    }

    #[test]
    fn test_overdraft_allowed_by_policy() {
        let pool = MemoryPool::new(MemStore::new(), PoolConfig::default());
        let repo = AccountRepository::new(Arc::new(pool.clone()));
        let manager = TransactionManager::new(Arc::new(pool.clone()));
        let service = TransferService::with_policy(
            manager,
            repo.clone(),
            TransferPolicy::new().allow_overdraft(true),
        );
        let ctx = TransactionContext::new();

        repo.insert(&ctx, &Account::new(A, 1_000)).unwrap();
        repo.insert(&ctx, &Account::new(B, 0)).unwrap();

        service.transfer(&ctx, A, B, 2_000).unwrap();
        assert_eq!(repo.find_by_id(&ctx, A).unwrap().balance, -1_000);
        assert_eq!(repo.find_by_id(&ctx, B).unwrap().balance, 2_000);
    }

    #[test]
    fn test_rejects_self_transfer_and_bad_amounts() {
        let fx = setup();
        seed(&fx, A, 10_000);

        for (from, to, amount) in [(A, A, 1_000), (A, B, 0), (A, B, -5)] {
            let err = fx.service.transfer(&fx.ctx, from, to, amount).unwrap_err();
            assert!(matches!(err, TransferError::Validation(_)));
        }
        assert_eq!(balance(&fx, A), 10_000);
        assert_all_returned(&fx);
    }
}
