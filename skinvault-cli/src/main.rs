//! SkinVault CLI - item prices and balance withdrawals in your terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use uuid::Uuid;

mod commands;
mod output;

use commands::{balance, config, items, logs, transactions, user, watch, withdraw};

/// SkinVault - Skinport prices and user balances
#[derive(Parser)]
#[command(name = "skv", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the merged price list
    Items {
        /// Drop the cached list and fetch from upstream
        #[arg(long)]
        refresh: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Poll the price list until interrupted
    Watch {
        /// Seconds between polls
        #[arg(long, default_value = "30")]
        every: u64,
        /// Output as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Debit a user's balance exactly once per idempotency key
    Withdraw {
        /// User to debit
        #[arg(long)]
        user_id: i64,
        /// Amount to debit, e.g. 12.50
        #[arg(long)]
        amount: Decimal,
        /// Idempotency key (generated when omitted)
        #[arg(long)]
        key: Option<Uuid>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a user's balance
    Balance {
        #[arg(long)]
        user_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List a user's transactions
    Transactions {
        #[arg(long)]
        user_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage users
    User {
        #[command(subcommand)]
        command: user::UserCommands,
    },

    /// Show or change settings
    Config {
        #[command(subcommand)]
        command: config::ConfigCommands,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Items { .. } => "items",
            Commands::Watch { .. } => "watch",
            Commands::Withdraw { .. } => "withdraw",
            Commands::Balance { .. } => "balance",
            Commands::Transactions { .. } => "transactions",
            Commands::User { .. } => "user",
            Commands::Config { .. } => "config",
            Commands::Logs { .. } => "logs",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let name = cli.command.name();
    let logger = commands::get_logger();

    match run(cli).await {
        Ok(()) => {
            commands::log_event(&logger, commands::command_event(name));
            ExitCode::SUCCESS
        }
        Err(e) => {
            commands::log_event(&logger, commands::failure_event(name, &e));
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

/// Diagnostics go to stderr so `--json` output stays parseable
fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("warn,skinvault_core=info,skv=info");
    env_logger::Builder::from_env(env)
        .target(env_logger::Target::Stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Items { refresh, json } => items::run(refresh, json).await,
        Commands::Watch { every, json } => watch::run(every, json).await,
        Commands::Withdraw { user_id, amount, key, json } => {
            withdraw::run(user_id, amount, key, json).await
        }
        Commands::Balance { user_id, json } => balance::run(user_id, json).await,
        Commands::Transactions { user_id, json } => transactions::run(user_id, json).await,
        Commands::User { command } => user::run(command).await,
        Commands::Config { command } => config::run(command),
        Commands::Logs { command } => logs::run(command),
    }
}
