//! Limits on monetary values the ledger can store exactly

use rust_decimal::Decimal;

use super::result::{Error, Result};

/// Decimal places kept by the ledger store
pub const MONEY_SCALE: u32 = 10;

/// Integer digits kept by the ledger store
const MONEY_INTEGER_DIGITS: u32 = 28;

/// Reject values the store would round or refuse
///
/// `what` names the value in the error message.
pub fn check_representable(value: Decimal, what: &str) -> Result<()> {
    if value.normalize().scale() > MONEY_SCALE {
        return Err(Error::validation(format!(
            "{} must have at most {} decimal places",
            what, MONEY_SCALE
        )));
    }
    if value.abs() >= Decimal::from_i128_with_scale(10_i128.pow(MONEY_INTEGER_DIGITS), 0) {
        return Err(Error::validation(format!(
            "{} must be below 10^{}",
            what, MONEY_INTEGER_DIGITS
        )));
    }
    Ok(())
}
