//! Summarizer error types
//!
//! Every variant is recoverable from the controller's point of view: a
//! failed or empty summary degrades to fallback content, it never drops a
//! proposal or blocks finalization.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SummarizerError {
    /// Network request failed.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    ApiResponse {
        /// HTTP status code (or the API's own code when provided).
        status: u16,
        /// Error message from API.
        message: String,
        /// Error type (if provided).
        error_type: Option<String>,
    },

    /// Model produced no usable text (empty candidates or blocked prompt).
    #[error("Empty model output: {0}")]
    Empty(String),

    /// Failed to parse API response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result type for summarizer operations.
pub type Result<T> = std::result::Result<T, SummarizerError>;
