//! Ledger repository port - balance and transaction storage

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{NewTransaction, Transaction, User};

/// Persistent store for user balances and their debit history
///
/// Implementations (adapters) must guarantee that `idempotency_key` is unique
/// across transactions and that a user's row lock, taken through
/// [`LedgerTx::lock_user_balance`], excludes every other transaction locking
/// the same user until commit or rollback.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Open a scoped read-modify-write transaction
    async fn begin(&self) -> Result<Box<dyn LedgerTx>>;

    /// Look up the transaction recorded for an idempotency key
    async fn find_transaction_by_idempotency_key(&self, key: Uuid) -> Result<Option<Transaction>>;

    /// Current balance of a user, `None` if the user does not exist
    async fn get_user_balance(&self, user_id: i64) -> Result<Option<Decimal>>;

    /// All transactions of a user, ordered by id ascending
    async fn list_transactions_by_user(&self, user_id: i64) -> Result<Vec<Transaction>>;

    /// Create a user with an opening balance; the store assigns the id
    async fn create_user(&self, balance: Decimal) -> Result<User>;
}

/// A single ledger transaction
///
/// Dropping it without calling [`commit`](Self::commit) rolls back every
/// write and releases any row lock it holds.
#[async_trait]
pub trait LedgerTx: Send {
    /// Take the exclusive row lock on a user and read their balance
    ///
    /// Waits while another transaction holds the same user's lock. Returns
    /// `None` if the user does not exist.
    async fn lock_user_balance(&mut self, user_id: i64) -> Result<Option<Decimal>>;

    /// Overwrite a locked user's balance
    async fn set_user_balance(&mut self, user_id: i64, balance: Decimal) -> Result<()>;

    /// Record a transaction
    ///
    /// Fails with `Error::DuplicateIdempotencyKey` if the key is already used.
    async fn insert_transaction(&mut self, tx: &NewTransaction) -> Result<Transaction>;

    /// Make all writes durable and release locks
    async fn commit(self: Box<Self>) -> Result<()>;
}
