//! Chat adapter error types
//!
//! `RateLimited` never escapes a public client method in practice: the
//! Discord client retries it in-call with backoff and only surfaces it once
//! the retry budget is spent.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("chat API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("chat API rate limited")]
    RateLimited,

    #[error("unexpected chat response: {message}")]
    InvalidResponse { message: String },

    #[error("invalid poll request: {message}")]
    InvalidRequest { message: String },
}

impl ChatError {
    /// Create a transport error with source
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an API error from a status code and response body
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create an invalid-response error
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Create an invalid-request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }
}

/// Result type for chat operations
pub type Result<T> = std::result::Result<T, ChatError>;
