//! Weather-specific error types.

use thiserror::Error;
use wxgate_core::{AppError, NetworkError};

/// Failures reaching or interpreting the upstream provider.
#[derive(Error, Debug, Clone)]
pub enum UpstreamError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Provider returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The payload decoded but lacks fields the service depends on.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl UpstreamError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Network(e) => e.user_message(),
            Self::Status { status, .. } if *status >= 500 => {
                "The weather provider is experiencing issues. Please try again later."
            }
            Self::Status { .. } => "The weather provider rejected the request.",
            Self::InvalidApiKey => "Weather API key is invalid. Check settings.",
            Self::NotFound(_) => "The weather provider has no data for this request.",
            Self::RateLimited(_) => "Too many weather requests. Please wait and try again.",
            Self::MalformedResponse(_) => "The weather provider sent an unexpected response.",
        }
    }

    /// Whether retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_transient(),
            Self::Status { status, .. } => *status >= 500,
            Self::RateLimited(_) => true,
            Self::InvalidApiKey | Self::NotFound(_) | Self::MalformedResponse(_) => false,
        }
    }
}

/// Errors returned by `WeatherService`.
#[derive(Error, Debug, Clone)]
pub enum WeatherError {
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Search query must not be empty")]
    InvalidQuery,

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),
}

impl WeatherError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidLocation(_) => "Latitude and longitude are required and must be in range.",
            Self::InvalidQuery => "Query parameter is required.",
            Self::Upstream(e) => e.user_message(),
        }
    }

    /// Validation failures caused by the caller's input (400-class).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidLocation(_) | Self::InvalidQuery)
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream(e) => e.is_retryable(),
            Self::InvalidLocation(_) | Self::InvalidQuery => false,
        }
    }
}

impl From<WeatherError> for AppError {
    fn from(e: WeatherError) -> Self {
        let user_message = e.user_message();
        AppError::Weather {
            detail: e.to_string(),
            user_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_client_errors() {
        assert!(WeatherError::InvalidQuery.is_client_error());
        assert!(WeatherError::InvalidLocation("lat".into()).is_client_error());
        assert!(!WeatherError::Upstream(UpstreamError::InvalidApiKey).is_client_error());
    }

    #[test]
    fn test_validation_errors_never_retry() {
        assert!(!WeatherError::InvalidQuery.is_retryable());
        assert!(!WeatherError::InvalidLocation("lat".into()).is_retryable());
    }

    #[test]
    fn test_upstream_retryable() {
        assert!(UpstreamError::RateLimited(30).is_retryable());
        assert!(UpstreamError::Network(NetworkError::Timeout).is_retryable());
        assert!(UpstreamError::Status { status: 503, message: String::new() }.is_retryable());
        assert!(!UpstreamError::Status { status: 400, message: String::new() }.is_retryable());
        assert!(!UpstreamError::malformed("no list").is_retryable());
    }

    #[test]
    fn test_malformed_is_an_upstream_error() {
        let err: WeatherError = UpstreamError::malformed("sample 3 has no wind block").into();
        assert!(matches!(
            err,
            WeatherError::Upstream(UpstreamError::MalformedResponse(_))
        ));
        assert!(err.to_string().contains("sample 3"));
    }

    #[test]
    fn test_app_error_conversion() {
        let app: AppError = WeatherError::InvalidQuery.into();
        assert_eq!(app.user_message(), "Query parameter is required.");
    }
}
