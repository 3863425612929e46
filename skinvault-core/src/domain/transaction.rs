//! Ledger transaction domain model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::check_representable;
use super::result::{Error, Result};

/// A committed balance debit
///
/// Invariants: `balance_after == balance_before - amount`, `amount > 0`,
/// `balance_after >= 0`. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub idempotency_key: Uuid,
    pub user_id: i64,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a transaction; the store assigns the id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub idempotency_key: Uuid,
    pub user_id: i64,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl NewTransaction {
    /// Debit `amount` from `balance_before`, stamped with the current time
    pub fn debit(request: &WithdrawRequest, balance_before: Decimal) -> Self {
        Self {
            idempotency_key: request.idempotency_key,
            user_id: request.user_id,
            balance_before,
            balance_after: balance_before - request.amount,
            amount: request.amount,
            created_at: Utc::now(),
        }
    }

    pub fn into_transaction(self, id: i64) -> Transaction {
        Transaction {
            id,
            idempotency_key: self.idempotency_key,
            user_id: self.user_id,
            balance_before: self.balance_before,
            balance_after: self.balance_after,
            amount: self.amount,
            created_at: self.created_at,
        }
    }
}

/// Request to debit a user's balance exactly once per idempotency key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub idempotency_key: Uuid,
    pub user_id: i64,
    pub amount: Decimal,
}

impl WithdrawRequest {
    pub fn new(idempotency_key: Uuid, user_id: i64, amount: Decimal) -> Self {
        Self {
            idempotency_key,
            user_id,
            amount,
        }
    }

    /// Reject non-positive amounts, amounts the store cannot hold exactly,
    /// and bad user ids before any store access
    pub fn validate(&self) -> Result<()> {
        if self.amount <= Decimal::ZERO {
            return Err(Error::validation("amount must be greater than zero"));
        }
        check_representable(self.amount, "amount")?;
        if self.user_id <= 0 {
            return Err(Error::validation("invalid user id"));
        }
        Ok(())
    }
}
