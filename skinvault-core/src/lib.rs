//! SkinVault Core - item price cache and balance ledger
//!
//! This crate follows a hexagonal layout:
//!
//! - **domain**: Core entities (Item, User, Transaction) and the error type
//! - **ports**: Trait definitions for external dependencies (LedgerRepository, PriceProvider)
//! - **services**: Business logic orchestration (prices, ledger, event log)
//! - **adapters**: Concrete implementations (DuckDB, in-memory, Skinport)
//! - **cache** / **ratelimit**: shared in-process state used by the price service

pub mod adapters;
pub mod cache;
pub mod clock;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod ratelimit;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use adapters::{DuckDbLedger, SkinportClient};
use cache::ExpiringCache;
use config::Config;
use ports::{LedgerRepository, PriceProvider};
use ratelimit::RateLimiter;
use services::{LedgerService, PriceService};

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult, Result};
pub use domain::{Balance, Item, SkinportItem, Transaction, User, WithdrawRequest};

/// File name of the ledger database inside the data directory
pub const LEDGER_DB_FILE: &str = "skinvault.duckdb";

/// Main context for SkinVault operations
///
/// Holds the configuration, the shared cache and rate limiter, and the
/// services built on them. Must be created inside a tokio runtime because
/// the cache starts its sweep task on construction.
pub struct SkinVaultContext {
    pub config: Config,
    pub repository: Arc<dyn LedgerRepository>,
    pub cache: Arc<ExpiringCache<Vec<Item>>>,
    pub limiter: Arc<RateLimiter>,
    pub price_service: PriceService,
    pub ledger_service: LedgerService,
}

impl SkinVaultContext {
    /// Load config from `data_dir`, open the ledger database there and
    /// connect to Skinport
    pub fn new(data_dir: &Path) -> Result<Self> {
        let config = Config::load(data_dir)?;
        let repository = Arc::new(DuckDbLedger::open(&data_dir.join(LEDGER_DB_FILE))?);
        let provider = Arc::new(SkinportClient::new_with_base_url(
            &config.skinport_addr,
            config.skinport_client_id.as_deref(),
            config.skinport_client_secret.as_deref(),
        )?);

        Ok(Self::with_parts(config, repository, provider))
    }

    /// Wire a context from explicit parts (alternative stores and providers)
    pub fn with_parts(
        config: Config,
        repository: Arc<dyn LedgerRepository>,
        provider: Arc<dyn PriceProvider>,
    ) -> Self {
        let cache = Arc::new(ExpiringCache::new(config.cache_cleanup_interval));
        let limiter = Arc::new(RateLimiter::new(config.rate_limit, config.rate_window));

        let price_service = PriceService::new(
            provider,
            Arc::clone(&cache),
            Arc::clone(&limiter),
            config.cache_ttl,
            config.upstream_timeout,
        );
        let ledger_service = LedgerService::new(Arc::clone(&repository));

        Self {
            config,
            repository,
            cache,
            limiter,
            price_service,
            ledger_service,
        }
    }

    /// Stop background work; waits for an in-flight cache sweep to finish
    pub async fn shutdown(&self) {
        self.cache.close().await;
        log::debug!("SkinVault context shut down");
    }
}
