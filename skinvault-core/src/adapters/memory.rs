//! In-memory ledger adapter
//!
//! Same locking and idempotency guarantees as the DuckDB adapter, without
//! persistence. Used for tests and throwaway sessions.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::adapters::row_lock::{RowGuard, RowLocks};
use crate::domain::result::{Error, Result};
use crate::domain::{NewTransaction, Transaction, User};
use crate::ports::{LedgerRepository, LedgerTx};

#[derive(Debug, Default)]
struct State {
    users: BTreeMap<i64, Decimal>,
    transactions: Vec<Transaction>,
    last_user_id: i64,
    last_transaction_id: i64,
}

impl State {
    fn key_taken(&self, key: Uuid) -> bool {
        self.transactions.iter().any(|tx| tx.idempotency_key == key)
    }
}

type SharedState = Arc<Mutex<State>>;

fn lock_state(state: &SharedState) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ledger kept entirely in process memory
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: SharedState,
    row_locks: Arc<RowLocks>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerRepository for MemoryLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>> {
        Ok(Box::new(MemoryTx {
            state: Arc::clone(&self.state),
            row_locks: Arc::clone(&self.row_locks),
            guards: HashMap::new(),
            balances: HashMap::new(),
            inserts: Vec::new(),
        }))
    }

    async fn find_transaction_by_idempotency_key(&self, key: Uuid) -> Result<Option<Transaction>> {
        let state = lock_state(&self.state);
        Ok(state
            .transactions
            .iter()
            .find(|tx| tx.idempotency_key == key)
            .cloned())
    }

    async fn get_user_balance(&self, user_id: i64) -> Result<Option<Decimal>> {
        Ok(lock_state(&self.state).users.get(&user_id).copied())
    }

    async fn list_transactions_by_user(&self, user_id: i64) -> Result<Vec<Transaction>> {
        let state = lock_state(&self.state);
        // Ids are assigned in increasing order, so insertion order is id order
        Ok(state
            .transactions
            .iter()
            .filter(|tx| tx.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_user(&self, balance: Decimal) -> Result<User> {
        User::validate_balance(balance)?;
        let mut state = lock_state(&self.state);
        state.last_user_id += 1;
        let id = state.last_user_id;
        state.users.insert(id, balance);
        Ok(User::new(id, balance))
    }
}

/// Writes are staged here and applied to the shared state on commit
struct MemoryTx {
    state: SharedState,
    row_locks: Arc<RowLocks>,
    guards: HashMap<i64, RowGuard>,
    balances: HashMap<i64, Decimal>,
    inserts: Vec<Transaction>,
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn lock_user_balance(&mut self, user_id: i64) -> Result<Option<Decimal>> {
        if !self.guards.contains_key(&user_id) {
            let guard = self.row_locks.lock(user_id).await;
            self.guards.insert(user_id, guard);
        }

        if let Some(staged) = self.balances.get(&user_id) {
            return Ok(Some(*staged));
        }
        Ok(lock_state(&self.state).users.get(&user_id).copied())
    }

    async fn set_user_balance(&mut self, user_id: i64, balance: Decimal) -> Result<()> {
        if !self.guards.contains_key(&user_id) {
            return Err(Error::database(format!(
                "balance of user {} updated without holding its row lock",
                user_id
            )));
        }
        if !lock_state(&self.state).users.contains_key(&user_id) {
            return Err(Error::UserNotFound(user_id));
        }
        self.balances.insert(user_id, balance);
        Ok(())
    }

    async fn insert_transaction(&mut self, tx: &NewTransaction) -> Result<Transaction> {
        let key = tx.idempotency_key;
        let mut state = lock_state(&self.state);
        if state.key_taken(key) || self.inserts.iter().any(|t| t.idempotency_key == key) {
            return Err(Error::DuplicateIdempotencyKey(key.to_string()));
        }
        // Like a database sequence, ids consumed by rolled back inserts are not reused
        state.last_transaction_id += 1;
        let inserted = tx.clone().into_transaction(state.last_transaction_id);
        self.inserts.push(inserted.clone());
        Ok(inserted)
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let mut state = lock_state(&self.state);

        // Another user's transaction may have committed the same key meanwhile
        if let Some(dup) = self.inserts.iter().find(|t| state.key_taken(t.idempotency_key)) {
            return Err(Error::DuplicateIdempotencyKey(dup.idempotency_key.to_string()));
        }

        for (user_id, balance) in self.balances.drain() {
            state.users.insert(user_id, balance);
        }
        state.transactions.append(&mut self.inserts);
        state.transactions.sort_by_key(|tx| tx.id);
        drop(state);

        // Row locks are released with `self`
        Ok(())
    }
}
