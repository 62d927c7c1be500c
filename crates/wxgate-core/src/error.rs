//! Shared error types for wxgate.
//!
//! Library crates define their own `thiserror` enums; this module holds the
//! pieces they share (transport classification, configuration failures) and
//! the top-level `AppError` used by the binary.

use thiserror::Error;

/// Top-level application error type.
///
/// Use `user_message()` to get a message suitable for printing to a terminal.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Weather-layer failures, carried with the weather crate's own user message.
    #[error("Weather service error: {detail}")]
    Weather {
        detail: String,
        user_message: &'static str,
    },
}

impl AppError {
    /// Returns a user-friendly message.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Config(e) => e.user_message(),
            AppError::Weather { user_message, .. } => user_message,
        }
    }
}

/// Network-related errors (HTTP, connectivity).
#[derive(Debug, Clone, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl NetworkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::ConnectionFailed(_) => {
                "Unable to reach the weather provider. Check your internet connection."
            }
            NetworkError::Timeout => "The weather provider timed out. Please try again.",
            NetworkError::ServerError { status, .. } if *status >= 500 => {
                "The weather provider is experiencing issues. Please try again later."
            }
            NetworkError::ServerError { .. } => "The request failed. Please try again.",
            NetworkError::InvalidResponse(_) => {
                "Received an unexpected response. Please try again."
            }
        }
    }

    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            NetworkError::ConnectionFailed(_) | NetworkError::Timeout => true,
            NetworkError::ServerError { status, .. } => *status >= 500 || *status == 408,
            NetworkError::InvalidResponse(_) => false,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No configuration directory for this platform")]
    NoConfigDir,

    #[error("Configuration file I/O failed: {0}")]
    Io(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NoConfigDir => "No configuration directory found. Pass --config PATH.",
            ConfigError::Io(_) => "The configuration file could not be read or written.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
        }
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_network_error(self) -> NetworkError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_network_error(self) -> NetworkError {
        if self.is_timeout() {
            NetworkError::Timeout
        } else if self.is_decode() {
            NetworkError::InvalidResponse(self.to_string())
        } else if let Some(status) = self.status() {
            NetworkError::ServerError {
                status: status.as_u16(),
                message: self.to_string(),
            }
        } else {
            NetworkError::ConnectionFailed(self.to_string())
        }
    }
}
