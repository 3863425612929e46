//! Result and error types for the core library

use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(i64),

    #[error("Insufficient balance: amount {amount} is greater than current balance {balance}")]
    InsufficientBalance { balance: Decimal, amount: Decimal },

    #[error("Rate limit exceeded: retry after {}s", .retry_after.as_secs())]
    RateLimitExceeded { retry_after: Duration },

    /// The upstream answered with a throttling status. Only seen between the
    /// provider and the price service, which turns it into `RateLimitExceeded`.
    #[error("Upstream throttled the request")]
    UpstreamThrottled { retry_after: Option<Duration> },

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction already recorded for idempotency key {0}")]
    DuplicateIdempotencyKey(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an upstream error
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    /// Minimum wait before retrying, for rate-limited failures
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded { retry_after } => Some(*retry_after),
            Self::UpstreamThrottled { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Whether the failure is the caller's fault (bad input, missing user,
    /// balance too low) rather than an infrastructure problem
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::NotFound(_)
                | Self::UserNotFound(_)
                | Self::InsufficientBalance { .. }
        )
    }
}

impl From<duckdb::Error> for Error {
    fn from(e: duckdb::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result with optional context (for JSON output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: None,
        }
    }

    /// Create a failed result with context
    pub fn fail_with_context(
        error: impl Into<String>,
        context: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: Some(context),
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => {
                let message = e.to_string();
                match e.retry_after() {
                    Some(retry_after) => {
                        let mut context = HashMap::new();
                        context.insert(
                            "retry_after_seconds".to_string(),
                            serde_json::json!(retry_after.as_secs()),
                        );
                        Self::fail_with_context(message, context)
                    }
                    None => Self::fail(message),
                }
            }
        }
    }
}
