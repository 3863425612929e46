//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. Services depend
//! only on these traits, not on concrete implementations.

mod ledger;
mod price_provider;

pub use ledger::{LedgerRepository, LedgerTx};
pub use price_provider::PriceProvider;
