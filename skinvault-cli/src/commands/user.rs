//! User command - create ledger accounts

use anyhow::Result;
use clap::Subcommand;
use rust_decimal::Decimal;

use super::get_context;
use crate::output;

#[derive(Subcommand)]
pub enum UserCommands {
    /// Create a user with an opening balance
    Create {
        /// Opening balance, must not be negative
        #[arg(long, default_value = "0")]
        balance: Decimal,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn run(command: UserCommands) -> Result<()> {
    match command {
        UserCommands::Create { balance, json } => {
            let ctx = get_context()?;
            let result = ctx.ledger_service.create_user(balance).await;
            ctx.shutdown().await;
            let user = result?;

            if json {
                println!("{}", serde_json::to_string_pretty(&user)?);
            } else {
                output::success(&format!("Created user {} with balance {:.2}", user.id, user.balance));
            }
        }
    }

    Ok(())
}
