//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions.

pub mod ledger;
pub mod logging;
pub mod migration;
pub mod prices;

pub use ledger::LedgerService;
pub use logging::{LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use prices::{merge_items, PriceService, RateLimitStatus, ITEMS_CACHE_KEY};
