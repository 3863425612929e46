//! Price service - cached, rate-limited view of upstream item prices

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::cache::ExpiringCache;
use crate::domain::result::{Error, Result};
use crate::domain::{Item, SkinportItem};
use crate::ports::PriceProvider;
use crate::ratelimit::RateLimiter;

/// Cache key of the merged price list
pub const ITEMS_CACHE_KEY: &str = "items";

/// Snapshot of the upstream quota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub remaining: usize,
    pub capacity: usize,
    pub retry_after: Duration,
}

/// Serves the merged tradable/non-tradable price list
///
/// A cache miss costs two upstream calls, each admitted by the rate limiter
/// first. Nothing here waits for quota: a denied call fails immediately with
/// `Error::RateLimitExceeded`.
pub struct PriceService {
    provider: Arc<dyn PriceProvider>,
    cache: Arc<ExpiringCache<Vec<Item>>>,
    limiter: Arc<RateLimiter>,
    cache_ttl: Duration,
    upstream_timeout: Duration,
}

impl PriceService {
    pub fn new(
        provider: Arc<dyn PriceProvider>,
        cache: Arc<ExpiringCache<Vec<Item>>>,
        limiter: Arc<RateLimiter>,
        cache_ttl: Duration,
        upstream_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            cache,
            limiter,
            cache_ttl,
            upstream_timeout,
        }
    }

    /// Return the merged price list, from cache when it is still fresh
    ///
    /// The caller's own deadline applies by wrapping this future in a
    /// timeout; dropping it cancels any in-flight upstream request.
    pub async fn get_items(&self) -> Result<Vec<Item>> {
        if let Some(items) = self.cache.get(ITEMS_CACHE_KEY) {
            log::debug!("Price list served from cache ({} items)", items.len());
            return Ok(items);
        }

        let tradable = self.fetch(true).await?;
        let non_tradable = self.fetch(false).await?;
        let items = merge_items(tradable, non_tradable);

        log::info!(
            "Fetched {} items from {}, caching for {}s",
            items.len(),
            self.provider.name(),
            self.cache_ttl.as_secs()
        );
        self.cache.set(ITEMS_CACHE_KEY, items.clone(), self.cache_ttl);
        Ok(items)
    }

    /// Drop the cached list so the next `get_items` goes upstream
    pub fn invalidate(&self) {
        self.cache.delete([ITEMS_CACHE_KEY]);
    }

    pub fn rate_limit_status(&self) -> RateLimitStatus {
        RateLimitStatus {
            remaining: self.limiter.remaining(),
            capacity: self.limiter.capacity(),
            retry_after: self.limiter.retry_after(),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    async fn fetch(&self, tradable: bool) -> Result<Vec<SkinportItem>> {
        if !self.limiter.allow() {
            let retry_after = self.limiter.retry_after();
            log::debug!("Upstream call denied locally, retry after {}s", retry_after.as_secs());
            return Err(Error::RateLimitExceeded { retry_after });
        }

        let call = self.provider.fetch_items(tradable);
        match tokio::time::timeout(self.upstream_timeout, call).await {
            Err(_) => Err(Error::upstream(format!(
                "{} did not answer within {}s",
                self.provider.name(),
                self.upstream_timeout.as_secs()
            ))),
            Ok(Err(Error::UpstreamThrottled { retry_after })) => {
                // A hint past the end of representable time counts as no hint
                match retry_after.and_then(|hint| Instant::now().checked_add(hint)) {
                    Some(until) => self.limiter.block_until(until),
                    None => self.limiter.force_fill(),
                }
                Err(Error::RateLimitExceeded {
                    retry_after: self.limiter.retry_after(),
                })
            }
            Ok(result) => result,
        }
    }
}

/// Merge both listings into one entry per `market_hash_name`
///
/// Name and currency come from the first occurrence of an item. The result
/// is sorted by name.
pub fn merge_items(tradable: Vec<SkinportItem>, non_tradable: Vec<SkinportItem>) -> Vec<Item> {
    let mut merged: BTreeMap<String, Item> = BTreeMap::new();

    for item in tradable {
        let price = item.min_price;
        merged
            .entry(item.market_hash_name.clone())
            .or_insert_with(|| Item::tradable(item.market_hash_name, item.currency, None))
            .min_price_tradable = price;
    }

    for item in non_tradable {
        let price = item.min_price;
        merged
            .entry(item.market_hash_name.clone())
            .or_insert_with(|| Item::non_tradable(item.market_hash_name, item.currency, None))
            .min_price_non_tradable = price;
    }

    merged.into_values().collect()
}
