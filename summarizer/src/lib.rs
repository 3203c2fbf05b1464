//! AI summarization for governance proposals.
//!
//! Wraps the Google Gemini generateContent API behind a small [`Summarizer`]
//! trait so callers can swap in a canned implementation for tests. Prompt
//! construction lives in [`prompts`] and is pure string work; the network
//! client lives in [`gemini`].

#![deny(clippy::print_stdout, clippy::print_stderr)]

use async_trait::async_trait;

pub mod errors;
pub mod gemini;
pub mod prompts;

pub use errors::Result;
pub use errors::SummarizerError;
pub use gemini::GeminiClient;
pub use gemini::GeminiConfig;
pub use prompts::MAX_PROMPT_RATIONALES;
pub use prompts::proposal_prompt;
pub use prompts::rationale_prompt;

/// A service that turns a prompt into a short piece of prose.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Generate text for `prompt`. Implementations return
    /// [`SummarizerError::Empty`] rather than an empty string.
    async fn summarize(&self, prompt: &str) -> Result<String>;
}
