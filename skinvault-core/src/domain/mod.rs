//! Core domain entities
//!
//! Pure data structures with validation logic - no I/O.

mod item;
pub mod money;
pub mod result;
mod transaction;
mod user;

pub use item::{Item, SkinportItem};
pub use transaction::{NewTransaction, Transaction, WithdrawRequest};
pub use user::{Balance, User};
