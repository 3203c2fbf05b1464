//! Store error types
//!
//! `InvalidTransition` and `NotFound` are integrity signals the controller
//! treats as bugs in the calling sequence; everything else wraps SQLite.

use crate::records::ProposalStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store open error: {message}")]
    Open {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("store query error: {message}")]
    Query {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("proposal {gaid} is {actual}, cannot move {expected} -> {target}")]
    InvalidTransition {
        gaid: String,
        expected: ProposalStatus,
        actual: ProposalStatus,
        target: ProposalStatus,
    },

    #[error("proposal {gaid} not found")]
    NotFound { gaid: String },
}

impl StoreError {
    /// Create an open error with source
    pub fn open_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Open {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a query error
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            source: None,
        }
    }

    /// Create a query error with source
    pub fn query_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Query {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
