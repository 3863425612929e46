//! Withdraw command - idempotent balance debit

use anyhow::{Context, Result};
use colored::Colorize;
use rust_decimal::Decimal;
use uuid::Uuid;

use skinvault_core::WithdrawRequest;

use super::get_context;
use crate::output;

pub async fn run(user_id: i64, amount: Decimal, key: Option<Uuid>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let generated = key.is_none();
    let request = WithdrawRequest::new(key.unwrap_or_else(Uuid::new_v4), user_id, amount);

    let result = ctx.ledger_service.withdraw(&request).await;
    ctx.shutdown().await;
    let tx = result.with_context(|| format!("Withdrawal for user {} failed", user_id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tx)?);
        return Ok(());
    }

    output::success(&format!("Withdrew {:.2} from user {}", tx.amount, tx.user_id));
    println!("  Transaction: {}", tx.id);
    println!("  Balance: {:.2} -> {}", tx.balance_before, format!("{:.2}", tx.balance_after).bold());
    if generated {
        println!("  Idempotency key: {}", tx.idempotency_key);
        println!("{}", "Pass --key with this value to retry safely.".dimmed());
    }

    Ok(())
}
