//! Chat adapter data types
//!
//! Platform-neutral shapes passed across the adapter boundary. Limits and
//! wire encodings (snowflakes, poll hours) are the Discord client's concern.

use chrono::{DateTime, Utc};

/// One selectable poll answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOption {
    pub text: String,
    /// Unicode emoji shown next to the answer, if any.
    pub emoji: Option<String>,
}

impl PollOption {
    pub fn new(text: impl Into<String>, emoji: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            emoji: Some(emoji.into()),
        }
    }
}

/// A poll to attach to a freshly created thread.
#[derive(Debug, Clone)]
pub struct PollRequest {
    pub question: String,
    /// Answers in display order; results come back in the same order.
    pub options: Vec<PollOption>,
    /// How long voting stays open, in minutes.
    pub duration_minutes: u32,
}

/// Handles recorded after a proposal thread goes up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadPost {
    pub thread_id: u64,
    pub poll_message_id: u64,
}

/// Vote count for one poll answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionCount {
    pub text: String,
    pub votes: u64,
}

/// A message read back from a thread sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMessage {
    pub id: u64,
    pub author: String,
    pub author_is_bot: bool,
    pub text: String,
    pub created_at: DateTime<Utc>,
}
