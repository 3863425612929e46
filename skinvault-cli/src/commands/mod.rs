//! CLI command implementations

pub mod balance;
pub mod config;
pub mod items;
pub mod logs;
pub mod transactions;
pub mod user;
pub mod watch;
pub mod withdraw;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use skinvault_core::services::{LogEvent, LoggingService};
use skinvault_core::SkinVaultContext;

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (never blocks a command)
pub fn get_logger() -> Option<LoggingService> {
    let data_dir = get_data_dir().ok()?;
    std::fs::create_dir_all(&data_dir).ok()?;
    match LoggingService::new(&data_dir, env!("CARGO_PKG_VERSION")) {
        Ok(service) => Some(service),
        Err(e) => {
            log::debug!("Event log unavailable: {:#}", e);
            None
        }
    }
}

/// Log an event, ignoring any errors
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        if let Err(e) = l.log(event) {
            log::debug!("Failed to record event: {:#}", e);
        }
    }
}

pub fn command_event(command: &str) -> LogEvent {
    LogEvent::new("command_executed").with_command(command)
}

/// Failure event; only the error kind is kept so no amounts or ids reach the log
pub fn failure_event(command: &str, error: &anyhow::Error) -> LogEvent {
    let kind = match error.downcast_ref::<skinvault_core::Error>() {
        Some(e) => error_kind(e),
        None => "internal",
    };
    LogEvent::new("command_failed")
        .with_command(command)
        .with_error(kind)
}

fn error_kind(error: &skinvault_core::Error) -> &'static str {
    use skinvault_core::Error;
    match error {
        Error::Validation(_) => "validation",
        Error::NotFound(_) | Error::UserNotFound(_) => "not_found",
        Error::InsufficientBalance { .. } => "insufficient_balance",
        Error::RateLimitExceeded { .. } | Error::UpstreamThrottled { .. } => "rate_limited",
        Error::Upstream(_) => "upstream",
        Error::Database(_) | Error::DuplicateIdempotencyKey(_) => "database",
        Error::Config(_) => "config",
        Error::Io(_) | Error::Json(_) => "internal",
    }
}

/// Data directory from `SKINVAULT_DIR`, else `~/.skinvault`
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("SKINVAULT_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".skinvault"))
        .ok_or_else(|| anyhow!("Could not find home directory, set SKINVAULT_DIR"))
}

/// Create the data directory if needed and open the context in it
pub fn get_context() -> Result<SkinVaultContext> {
    let data_dir = get_data_dir()?;

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

    SkinVaultContext::new(&data_dir).context("Failed to initialize skinvault context")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_failure_event_keeps_only_error_kind() {
        let err = anyhow::Error::new(skinvault_core::Error::InsufficientBalance {
            balance: dec!(70),
            amount: dec!(1000),
        });
        let event = failure_event("withdraw", &err);

        assert_eq!(event.event, "command_failed");
        assert_eq!(event.command.as_deref(), Some("withdraw"));
        assert_eq!(event.error_message.as_deref(), Some("insufficient_balance"));
    }

    #[test]
    fn test_failure_event_for_context_wrapped_error() {
        let err = anyhow::Error::new(skinvault_core::Error::UserNotFound(9))
            .context("Failed to load balance");
        let event = failure_event("balance", &err);
        assert_eq!(event.error_message.as_deref(), Some("not_found"));
    }

    #[test]
    fn test_failure_event_for_plain_error() {
        let event = failure_event("items", &anyhow!("boom"));
        assert_eq!(event.error_message.as_deref(), Some("internal"));
    }
}
