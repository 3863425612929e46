//! Items command - show the merged Skinport price list

use anyhow::Result;
use colored::Colorize;
use comfy_table::Table;

use skinvault_core::Item;

use super::get_context;
use crate::output::{self, create_table, format_price};

pub async fn run(refresh: bool, json: bool) -> Result<()> {
    let ctx = get_context()?;
    if refresh {
        ctx.price_service.invalidate();
    }

    let result = ctx.price_service.get_items().await;
    ctx.shutdown().await;
    let items = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        output::warning("Upstream returned no items.");
        return Ok(());
    }

    println!("{}", items_table(&items));
    println!();

    let status = ctx.price_service.rate_limit_status();
    println!(
        "{} items from {} ({} of {} upstream calls left)",
        items.len().to_string().bold(),
        ctx.price_service.provider_name(),
        status.remaining,
        status.capacity
    );

    Ok(())
}

pub fn items_table(items: &[Item]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Item", "Currency", "Tradable", "Non-tradable"]);

    for item in items {
        table.add_row(vec![
            item.market_hash_name.clone(),
            item.currency.clone(),
            format_price(item.min_price_tradable),
            format_price(item.min_price_non_tradable),
        ]);
    }

    table
}
