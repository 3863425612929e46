//! Transactions command - a user's withdrawal history

use anyhow::Result;

use super::get_context;
use crate::output::{self, create_table};

pub async fn run(user_id: i64, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = ctx.ledger_service.get_transactions(user_id).await;
    ctx.shutdown().await;
    let transactions = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&transactions)?);
        return Ok(());
    }

    if transactions.is_empty() {
        output::info(&format!("No transactions for user {}.", user_id));
        return Ok(());
    }

    let mut table = create_table();
    table.set_header(vec!["ID", "Time", "Amount", "Before", "After", "Key"]);
    for tx in &transactions {
        table.add_row(vec![
            tx.id.to_string(),
            tx.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            format!("{:.2}", tx.amount),
            format!("{:.2}", tx.balance_before),
            format!("{:.2}", tx.balance_after),
            tx.idempotency_key.to_string(),
        ]);
    }
    println!("{}", table);

    Ok(())
}
