//! Chat platform adapter
//!
//! The bot talks to its chat platform through the [`ChatPlatform`] trait:
//! create a proposal thread with a native poll attached, read the tally
//! back, post follow-up messages, and sweep thread replies. The shipped
//! implementation is [`DiscordClient`] over the Discord REST API; tests
//! substitute an in-memory fake.

#![deny(clippy::print_stdout, clippy::print_stderr)]

use async_trait::async_trait;

pub mod discord;
pub mod errors;
pub mod types;

pub use discord::DiscordClient;
pub use errors::ChatError;
pub use errors::Result;
pub use types::OptionCount;
pub use types::PollOption;
pub use types::PollRequest;
pub use types::ThreadMessage;
pub use types::ThreadPost;

/// Operations the bot needs from a chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Create a public thread under `channel_id`, post `body` into it, and
    /// attach `poll`. Returns the ids the caller must persist to find the
    /// thread and its poll again after a restart.
    async fn create_thread_with_poll(
        &self,
        channel_id: u64,
        title: &str,
        body: &str,
        poll: &PollRequest,
    ) -> Result<ThreadPost>;

    /// Current vote counts for the poll, one entry per answer in display
    /// order. Valid both while the poll runs and after it expires.
    async fn poll_results(&self, thread_id: u64, poll_message_id: u64)
    -> Result<Vec<OptionCount>>;

    /// Post a plain text message to a thread, returning its id.
    async fn post_message(&self, thread_id: u64, text: &str) -> Result<u64>;

    /// Messages in the thread with ids strictly greater than `after`
    /// (all messages when `None`), ascending by id.
    async fn thread_messages_after(
        &self,
        thread_id: u64,
        after: Option<u64>,
    ) -> Result<Vec<ThreadMessage>>;
}
