//! Price service tests against a scripted provider
//!
//! All tests run on paused tokio time so TTLs, rate windows and upstream
//! timeouts elapse instantly and deterministically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use skinvault_core::cache::ExpiringCache;
use skinvault_core::ports::PriceProvider;
use skinvault_core::ratelimit::RateLimiter;
use skinvault_core::services::PriceService;
use skinvault_core::{Error, Result, SkinportItem};

const TTL: Duration = Duration::from_secs(300);
const WINDOW: Duration = Duration::from_secs(300);
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

/// One scripted upstream answer
enum Reply {
    Items(Vec<SkinportItem>),
    Throttled(Option<Duration>),
    Broken,
    Hang,
}

/// Provider that answers from per-listing queues and counts calls
///
/// An empty queue answers with a single default listing.
#[derive(Default)]
struct ScriptedProvider {
    tradable: Mutex<VecDeque<Reply>>,
    non_tradable: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn push(&self, tradable: bool, reply: Reply) {
        let queue = if tradable { &self.tradable } else { &self.non_tradable };
        queue.lock().unwrap().push_back(reply);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn listing(name: &str, price: Decimal) -> SkinportItem {
    SkinportItem {
        market_hash_name: name.to_string(),
        currency: "EUR".to_string(),
        min_price: Some(price),
        quantity: 3,
    }
}

#[async_trait]
impl PriceProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_items(&self, tradable: bool) -> Result<Vec<SkinportItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let queue = if tradable { &self.tradable } else { &self.non_tradable };
        let reply = queue.lock().unwrap().pop_front();

        match reply {
            Some(Reply::Items(items)) => Ok(items),
            Some(Reply::Throttled(retry_after)) => Err(Error::UpstreamThrottled { retry_after }),
            Some(Reply::Broken) => Err(Error::upstream("Skinport API error: HTTP 502")),
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
            None if tradable => Ok(vec![listing("AK-47 | Redline", dec!(11.87))]),
            None => Ok(vec![listing("AK-47 | Redline", dec!(10.02))]),
        }
    }
}

fn service(provider: &Arc<ScriptedProvider>, capacity: usize) -> PriceService {
    PriceService::new(
        Arc::clone(provider) as Arc<dyn PriceProvider>,
        Arc::new(ExpiringCache::new(Duration::from_secs(60))),
        Arc::new(RateLimiter::new(capacity, WINDOW)),
        TTL,
        UPSTREAM_TIMEOUT,
    )
}

#[tokio::test(start_paused = true)]
async fn test_second_call_is_served_from_cache() {
    let provider = Arc::new(ScriptedProvider::default());
    let prices = service(&provider, 8);

    let first = prices.get_items().await.unwrap();
    let second = prices.get_items().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].min_price_tradable, Some(dec!(11.87)));
    assert_eq!(first[0].min_price_non_tradable, Some(dec!(10.02)));
    assert_eq!(provider.calls(), 2);
    assert_eq!(prices.rate_limit_status().remaining, 6);
}

#[tokio::test(start_paused = true)]
async fn test_expired_cache_triggers_refetch() {
    let provider = Arc::new(ScriptedProvider::default());
    let prices = service(&provider, 8);

    prices.get_items().await.unwrap();
    tokio::time::advance(TTL - Duration::from_secs(1)).await;
    prices.get_items().await.unwrap();
    assert_eq!(provider.calls(), 2);

    tokio::time::advance(Duration::from_secs(2)).await;
    prices.get_items().await.unwrap();
    assert_eq!(provider.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_forces_refetch() {
    let provider = Arc::new(ScriptedProvider::default());
    let prices = service(&provider, 8);

    prices.get_items().await.unwrap();
    prices.invalidate();
    provider.push(true, Reply::Items(vec![listing("AWP | Asiimov", dec!(68.50))]));
    provider.push(false, Reply::Items(vec![]));

    let items = prices.get_items().await.unwrap();
    assert_eq!(provider.calls(), 4);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].market_hash_name, "AWP | Asiimov");
    assert_eq!(items[0].min_price_non_tradable, None);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_quota_fails_without_upstream_call() {
    let provider = Arc::new(ScriptedProvider::default());
    let prices = service(&provider, 2);

    prices.get_items().await.unwrap();
    prices.invalidate();

    let err = prices.get_items().await.unwrap_err();
    assert!(matches!(err, Error::RateLimitExceeded { retry_after } if retry_after == WINDOW));
    assert_eq!(provider.calls(), 2, "denied call must not reach upstream");

    // Quota frees once the window has passed
    tokio::time::advance(WINDOW).await;
    prices.get_items().await.unwrap();
    assert_eq!(provider.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_throttle_without_hint_blocks_full_window() {
    let provider = Arc::new(ScriptedProvider::default());
    let prices = service(&provider, 8);
    provider.push(true, Reply::Throttled(None));

    let err = prices.get_items().await.unwrap_err();
    assert_eq!(err.retry_after(), Some(WINDOW));
    assert_eq!(provider.calls(), 1);

    let status = prices.rate_limit_status();
    assert_eq!(status.remaining, 0);
    assert_eq!(status.retry_after, WINDOW);

    // Local denial from now on, upstream is left alone
    let err = prices.get_items().await.unwrap_err();
    assert!(matches!(err, Error::RateLimitExceeded { .. }));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_throttle_hint_is_honoured_exactly() {
    let provider = Arc::new(ScriptedProvider::default());
    let prices = service(&provider, 8);
    provider.push(true, Reply::Throttled(Some(Duration::from_secs(42))));

    let err = prices.get_items().await.unwrap_err();
    assert_eq!(err.retry_after(), Some(Duration::from_secs(42)));

    tokio::time::advance(Duration::from_secs(41)).await;
    assert!(prices.get_items().await.is_err());
    assert_eq!(provider.calls(), 1);

    tokio::time::advance(Duration::from_secs(1)).await;
    prices.get_items().await.unwrap();
    assert_eq!(provider.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_unrepresentable_throttle_hint_blocks_full_window() {
    let provider = Arc::new(ScriptedProvider::default());
    let prices = service(&provider, 8);
    provider.push(true, Reply::Throttled(Some(Duration::from_secs(u64::MAX))));

    let err = prices.get_items().await.unwrap_err();
    assert_eq!(err.retry_after(), Some(WINDOW));
    assert_eq!(prices.rate_limit_status().remaining, 0);

    tokio::time::advance(WINDOW).await;
    prices.get_items().await.unwrap();
    assert_eq!(provider.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_non_tradable_failure_leaves_cache_empty() {
    let provider = Arc::new(ScriptedProvider::default());
    let prices = service(&provider, 8);
    provider.push(false, Reply::Broken);

    let err = prices.get_items().await.unwrap_err();
    assert!(matches!(err, Error::Upstream(_)));

    // Nothing partial was cached, so the next call goes upstream again
    prices.get_items().await.unwrap();
    assert_eq!(provider.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_upstream_times_out() {
    let provider = Arc::new(ScriptedProvider::default());
    let prices = service(&provider, 8);
    provider.push(true, Reply::Hang);

    let started = tokio::time::Instant::now();
    let err = prices.get_items().await.unwrap_err();

    assert!(matches!(err, Error::Upstream(ref message) if message.contains("did not answer")));
    assert!(started.elapsed() >= UPSTREAM_TIMEOUT);
    // The timed-out call still used its quota slot
    assert_eq!(prices.rate_limit_status().remaining, 7);
}

#[tokio::test(start_paused = true)]
async fn test_caller_deadline_cancels_fetch() {
    let provider = Arc::new(ScriptedProvider::default());
    let prices = service(&provider, 8);
    provider.push(true, Reply::Hang);

    let outcome = tokio::time::timeout(Duration::from_secs(1), prices.get_items()).await;
    assert!(outcome.is_err());

    // Abandoned fetch cached nothing
    assert!(prices.get_items().await.is_ok());
    assert_eq!(provider.calls(), 3);
}
