//! Balance command

use anyhow::Result;
use colored::Colorize;

use super::get_context;

pub async fn run(user_id: i64, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = ctx.ledger_service.get_balance(user_id).await;
    ctx.shutdown().await;
    let balance = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&balance)?);
    } else {
        println!("User {}: {}", balance.user_id, format!("{:.2}", balance.balance).bold());
    }

    Ok(())
}
