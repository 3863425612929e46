//! Ledger service - idempotent balance withdrawals

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::domain::result::{Error, Result};
use crate::domain::{Balance, NewTransaction, Transaction, User, WithdrawRequest};
use crate::ports::LedgerRepository;

/// Debits balances exactly once per idempotency key
pub struct LedgerService {
    repository: Arc<dyn LedgerRepository>,
}

impl LedgerService {
    pub fn new(repository: Arc<dyn LedgerRepository>) -> Self {
        Self { repository }
    }

    /// Debit `request.amount` from the user's balance
    ///
    /// Replaying a key that already has a committed transaction returns that
    /// transaction unchanged, whatever the other fields of the replay say.
    /// On any failure the whole debit is rolled back and the key stays unused.
    pub async fn withdraw(&self, request: &WithdrawRequest) -> Result<Transaction> {
        request.validate()?;

        if let Some(existing) = self
            .repository
            .find_transaction_by_idempotency_key(request.idempotency_key)
            .await?
        {
            log::debug!("Idempotency key replayed, returning transaction {}", existing.id);
            return Ok(existing);
        }

        match self.debit(request).await {
            Err(Error::DuplicateIdempotencyKey(_)) => {
                // A concurrent request with the same key committed first
                self.repository
                    .find_transaction_by_idempotency_key(request.idempotency_key)
                    .await?
                    .ok_or_else(|| {
                        Error::database("idempotency key conflict but no transaction recorded")
                    })
            }
            result => result,
        }
    }

    async fn debit(&self, request: &WithdrawRequest) -> Result<Transaction> {
        // Dropping `tx` on any early return rolls everything back
        let mut tx = self.repository.begin().await?;

        let balance = tx
            .lock_user_balance(request.user_id)
            .await?
            .ok_or(Error::UserNotFound(request.user_id))?;

        let new_tx = NewTransaction::debit(request, balance);
        if new_tx.balance_after < Decimal::ZERO {
            return Err(Error::InsufficientBalance {
                balance,
                amount: request.amount,
            });
        }

        tx.set_user_balance(request.user_id, new_tx.balance_after).await?;
        let recorded = tx.insert_transaction(&new_tx).await?;
        tx.commit().await?;

        log::info!("Recorded withdrawal transaction {}", recorded.id);
        Ok(recorded)
    }

    pub async fn get_balance(&self, user_id: i64) -> Result<Balance> {
        let balance = self
            .repository
            .get_user_balance(user_id)
            .await?
            .ok_or(Error::UserNotFound(user_id))?;
        Ok(Balance { user_id, balance })
    }

    /// Transactions of a user in id order; empty for unknown users
    pub async fn get_transactions(&self, user_id: i64) -> Result<Vec<Transaction>> {
        self.repository.list_transactions_by_user(user_id).await
    }

    pub async fn create_user(&self, balance: Decimal) -> Result<User> {
        let user = self.repository.create_user(balance).await?;
        log::info!("Created user {}", user.id);
        Ok(user)
    }
}
