//! Feed error types
//!
//! The controller treats every feed failure as retryable at the cycle level:
//! log, skip this discovery pass, try again next interval. `RateLimited` is
//! additionally retried in-call with backoff before it ever surfaces.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("feed rate limited")]
    RateLimited,

    #[error("feed payload malformed: {message}")]
    Malformed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl FeedError {
    /// Create an unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Create an unavailable error with source
    pub fn unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Unavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a malformed-payload error with source
    pub fn malformed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Malformed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for feed operations
pub type Result<T> = std::result::Result<T, FeedError>;
