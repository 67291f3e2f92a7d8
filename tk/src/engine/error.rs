//! Reasoning engine error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during engine calls
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Process failed with {status}: {stderr}")]
    Process { status: String, stderr: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Check if this is a rate limit error
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, EngineError::RateLimited { .. })
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::RateLimited { .. } => true,
            EngineError::ApiError { status, .. } => *status == 408 || *status >= 500,
            EngineError::Network(_) => true,
            EngineError::Timeout(_) => true,
            EngineError::Process { .. } => false,
            EngineError::InvalidResponse(_) => false,
            EngineError::Json(_) => false,
        }
    }

    /// Get the retry duration if this is a rate limit error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            EngineError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(
            EngineError::RateLimited {
                retry_after: Duration::from_secs(60)
            }
            .is_retryable()
        );

        // Server errors and request timeouts are retryable, other 4xx not
        assert!(
            EngineError::ApiError {
                status: 503,
                message: "Overloaded".to_string()
            }
            .is_retryable()
        );
        assert!(
            EngineError::ApiError {
                status: 529,
                message: "Overloaded".to_string()
            }
            .is_retryable()
        );
        assert!(
            EngineError::ApiError {
                status: 408,
                message: "Request timeout".to_string()
            }
            .is_retryable()
        );
        assert!(
            !EngineError::ApiError {
                status: 400,
                message: "Bad request".to_string()
            }
            .is_retryable()
        );

        assert!(EngineError::Timeout(Duration::from_secs(30)).is_retryable());

        // A failed subprocess or malformed output will fail the same way again
        assert!(
            !EngineError::Process {
                status: "exit status: 1".to_string(),
                stderr: "boom".to_string()
            }
            .is_retryable()
        );
        assert!(!EngineError::InvalidResponse("Bad JSON".to_string()).is_retryable());
    }

    #[test]
    fn test_retry_after() {
        let err = EngineError::RateLimited {
            retry_after: Duration::from_secs(42),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(42)));

        let err = EngineError::Timeout(Duration::from_secs(5));
        assert_eq!(err.retry_after(), None);
    }
}
