//! Price provider port
//!
//! Defines the interface for fetching item listings from an upstream
//! marketplace.

use async_trait::async_trait;

use crate::domain::result::Result;
use crate::domain::SkinportItem;

/// Upstream source of per-item minimum prices
///
/// Errors:
/// * `Error::UpstreamThrottled` when the upstream answers 429, carrying the
///   `Retry-After` hint if one was given and parseable
/// * `Error::Upstream` for every other non-success status and for transport
///   failures
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Provider name (e.g., "skinport")
    fn name(&self) -> &str;

    /// Fetch the listing for tradable or non-tradable items
    async fn fetch_items(&self, tradable: bool) -> Result<Vec<SkinportItem>>;
}
