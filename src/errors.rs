//! Application error model with MCP error mapping
//!
//! Defines a typed error hierarchy using `thiserror` for internal error handling,
//! and maps each variant to the appropriate MCP `ErrorData` type for protocol
//! compliance.

use rmcp::model::ErrorData;
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

/// Application error type
///
/// Covers all error cases the mailbox bridge may encounter. Each variant maps
/// to an appropriate MCP error code in [`ErrorData`].
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid user input (validation failed, malformed request)
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Mail store unreachable after exhausting connection retries
    #[error("connection failed: {0}")]
    Connection(String),
    /// A specific mailbox could not be resolved
    #[error("mailbox not found: {0}")]
    MailboxNotFound(String),
    /// A mailbox exists but the current user lacks permission
    #[error("mailbox not accessible: {0}")]
    NotAccessible(String),
    /// Every strategy in the search cascade failed for a folder
    #[error("all search strategies failed: {0}")]
    StrategyFailed(String),
    /// Operation timeout (connect, index search polling, detail fetch)
    #[error("operation timed out: {0}")]
    Timeout(String),
    /// Internal error (unexpected failure, external crate error)
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Convert to MCP `ErrorData`
    ///
    /// Maps each `AppError` variant to the appropriate MCP error type and
    /// includes a structured `code` field for client error handling.
    ///
    /// # Mappings
    ///
    /// - `InvalidInput` → `invalid_params`
    /// - `MailboxNotFound` → `resource_not_found`
    /// - `NotAccessible` → `invalid_request`
    /// - `Connection` / `StrategyFailed` / `Timeout` / `Internal` → `internal_error`
    pub fn to_error_data(&self) -> ErrorData {
        match self {
            Self::InvalidInput(msg) => {
                ErrorData::invalid_params(msg.clone(), Some(json!({ "code": "invalid_input" })))
            }
            Self::MailboxNotFound(msg) => ErrorData::resource_not_found(
                msg.clone(),
                Some(json!({ "code": "mailbox_not_found" })),
            ),
            Self::NotAccessible(msg) => {
                ErrorData::invalid_request(msg.clone(), Some(json!({ "code": "not_accessible" })))
            }
            Self::Connection(msg) => {
                ErrorData::internal_error(msg.clone(), Some(json!({ "code": "connection" })))
            }
            Self::StrategyFailed(msg) => {
                ErrorData::internal_error(msg.clone(), Some(json!({ "code": "strategy_failed" })))
            }
            Self::Timeout(msg) => {
                ErrorData::internal_error(msg.clone(), Some(json!({ "code": "timeout" })))
            }
            Self::Internal(msg) => {
                ErrorData::internal_error(msg.clone(), Some(json!({ "code": "internal" })))
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => Self::Connection(msg),
            StoreError::NotFound(msg) => Self::MailboxNotFound(msg),
            StoreError::AccessDenied(msg) => Self::NotAccessible(msg),
            StoreError::IndexUnavailable(msg) => Self::StrategyFailed(msg),
            StoreError::Backend(msg) => Self::Internal(msg),
        }
    }
}

/// Type alias for fallible return values
///
/// Use this for all internal functions that can fail. Provides a consistent
/// error type throughout the codebase.
pub type AppResult<T> = Result<T, AppError>;
