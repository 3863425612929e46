//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the LedgerRepository port
//! - An in-memory store for the LedgerRepository port (tests, throwaway runs)
//! - Skinport HTTP client for the PriceProvider port

pub mod duckdb;
pub mod memory;
pub mod row_lock;
pub mod skinport;

#[cfg(test)]
pub mod skinport_mock;

pub use self::duckdb::DuckDbLedger;
pub use memory::MemoryLedger;
pub use row_lock::RowLocks;
pub use skinport::SkinportClient;
