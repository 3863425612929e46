//! User domain model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money::check_representable;
use super::result::{Error, Result};

/// A ledger account holder. The balance never goes below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub balance: Decimal,
}

impl User {
    pub fn new(id: i64, balance: Decimal) -> Self {
        Self { id, balance }
    }

    /// Check an opening balance before a user is created
    pub fn validate_balance(balance: Decimal) -> Result<()> {
        if balance < Decimal::ZERO {
            return Err(Error::validation("balance must not be negative"));
        }
        check_representable(balance, "balance")
    }
}

/// Current balance of a user, as reported by `LedgerService::get_balance`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub user_id: i64,
    pub balance: Decimal,
}

impl From<User> for Balance {
    fn from(user: User) -> Self {
        Self {
            user_id: user.id,
            balance: user.balance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_balance_from_user() {
        let balance = Balance::from(User::new(3, dec!(12.50)));
        assert_eq!(balance.user_id, 3);
        assert_eq!(balance.balance, dec!(12.5));
    }

    #[test]
    fn test_validate_balance() {
        assert!(User::validate_balance(dec!(0)).is_ok());
        assert!(User::validate_balance(dec!(100.0000000001)).is_ok());

        let err = User::validate_balance(dec!(-1)).unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m == "balance must not be negative"));

        let err = User::validate_balance(dec!(0.00000000001)).unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m.contains("decimal places")));
    }
}
