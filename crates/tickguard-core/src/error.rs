use thiserror::Error;

use crate::classifier::ClassifiedError;

/// Failures of the session renewal path.
///
/// Cloneable because one renewal outcome is handed to every waiter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("not authenticated: no refresh token available")]
    NotAuthenticated,
    #[error("token renewal rejected: {0}")]
    Rejected(ClassifiedError),
    #[error("token renewal response was malformed: {0}")]
    MalformedResponse(String),
    #[error("token renewal task aborted")]
    Aborted,
}

/// Credential persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("credential store contents are invalid: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Invalid configuration values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },
    #[error("base url must start with http:// or https://: '{value}'")]
    InvalidBaseUrl { value: String },
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

/// Background channel errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackgroundError {
    #[error("unknown background message '{0}'")]
    UnknownMessage(String),
    #[error("background channel is closed")]
    Closed,
}
