//! Coded application errors.
//!
//! Components return `anyhow::Result`; failures that carry a classification
//! wrap an [`AppError`] so callers can recover the [`ErrorCode`] with
//! [`error_code`] regardless of how much context was layered on top.

mod codes;
mod info;
mod sanitize;

pub use codes::ErrorCode;
pub use info::{error_info, error_info_for, is_retryable, ErrorInfo};
pub use sanitize::{contains_sensitive_data, sanitize_for_logging};

use serde::Serialize;
use thiserror::Error;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

#[derive(Debug, Clone, Error, Serialize, PartialEq, Eq)]
#[error("{message}")]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        if contains_sensitive_data(&message) {
            log_warn!("error message may contain sensitive data: {code}");
        }
        Self { code, message }
    }

    /// Combines a lower-level error into the message as `"{message}: {source}"`.
    pub fn wrap(source: impl std::fmt::Display, code: ErrorCode, message: &str) -> Self {
        Self::new(code, format!("{message}: {source}"))
    }
}

/// Finds the first [`AppError`] in the chain and returns its code.
pub fn error_code(err: &anyhow::Error) -> Option<ErrorCode> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<AppError>())
        .map(|app_err| app_err.code)
}

pub fn is_auth_error(code: ErrorCode) -> bool {
    code.is_auth_error()
}

pub fn is_connection_error(code: ErrorCode) -> bool {
    code.is_connection_error()
}
