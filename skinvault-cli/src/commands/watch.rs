//! Watch command - poll the price list until Ctrl+C

use std::time::Duration;

use anyhow::{bail, Result};
use colored::Colorize;
use tokio::time::MissedTickBehavior;

use skinvault_core::services::ITEMS_CACHE_KEY;
use skinvault_core::{Error, SkinVaultContext};

use super::get_context;
use crate::output;

pub async fn run(every: u64, json: bool) -> Result<()> {
    if every == 0 {
        bail!("--every must be at least 1 second");
    }

    let ctx = get_context()?;
    let mut ticker = tokio::time::interval(Duration::from_secs(every));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    if !json {
        output::info(&format!(
            "Polling {} every {}s, press Ctrl+C to stop",
            ctx.price_service.provider_name(),
            every
        ));
    }

    let outcome = loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = poll_once(&ctx, json).await {
                    break Err(e);
                }
            }
            signal = tokio::signal::ctrl_c() => {
                break signal.map_err(anyhow::Error::from);
            }
        }
    };

    ctx.shutdown().await;
    if !json {
        output::success("Stopped.");
    }
    outcome
}

/// One poll; quota and upstream failures are reported and the loop goes on
async fn poll_once(ctx: &SkinVaultContext, json: bool) -> Result<()> {
    let cached_before = ctx.cache.get(ITEMS_CACHE_KEY).is_some();
    let result = ctx.price_service.get_items().await;
    let status = ctx.price_service.rate_limit_status();
    let now = chrono::Local::now().format("%H:%M:%S").to_string();

    match result {
        Ok(items) => {
            let source = if cached_before { "cache" } else { "upstream" };
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "time": now,
                        "items": items.len(),
                        "source": source,
                        "remaining": status.remaining,
                    })
                );
            } else {
                println!(
                    "{} {} items from {} ({}/{} calls left)",
                    now.dimmed(),
                    items.len(),
                    source,
                    status.remaining,
                    status.capacity
                );
            }
            Ok(())
        }
        Err(e @ (Error::RateLimitExceeded { .. } | Error::Upstream(_))) => {
            let retry = e.retry_after().map(|d| d.as_secs());
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "time": now,
                        "error": e.to_string(),
                        "retry_after_seconds": retry,
                    })
                );
            } else {
                output::warning(&format!("{} {}", now, e));
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
