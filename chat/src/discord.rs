//! Discord REST client
//!
//! Talks to the Discord HTTP API (v10) directly: create a public thread in
//! the announcement channel, post the proposal body, attach a native poll,
//! and later read the tally back and sweep thread replies. Snowflake ids
//! cross the wire as strings and are parsed to `u64` at this boundary;
//! malformed entries are dropped with a log instead of failing a sweep.

use crate::ChatPlatform;
use crate::errors::{ChatError, Result};
use crate::types::{OptionCount, PollRequest, ThreadMessage, ThreadPost};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use std::future::Future;
use std::time::Duration;

/// Discord HTTP API host and version
const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Discord requires a DiscordBot-shaped user agent on REST calls
const USER_AGENT_VALUE: &str = "DiscordBot (agora, 0.1)";

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Channel type for a public thread
const CHANNEL_TYPE_PUBLIC_THREAD: u8 = 11;

/// Threads auto-archive after a week of inactivity
const THREAD_AUTO_ARCHIVE_MINUTES: u32 = 10_080;

/// Discord caps thread names at 100 characters
const THREAD_NAME_MAX_CHARS: usize = 100;

/// Poll question text limit
const POLL_QUESTION_MAX_CHARS: usize = 300;

/// Poll answer text limit
const POLL_ANSWER_MAX_CHARS: usize = 55;

/// Discord allows at most ten poll answers
const MAX_POLL_ANSWERS: usize = 10;

/// Poll lifetime bounds on the wire, in hours
const MIN_POLL_HOURS: u32 = 1;
const MAX_POLL_HOURS: u32 = 768;

/// Page size for thread message sweeps
const MESSAGE_PAGE_LIMIT: usize = 100;

/// Rate-limit backoff: 1s doubling up to 60s, bounded attempts
const RATE_LIMIT_MIN_DELAY: Duration = Duration::from_secs(1);
const RATE_LIMIT_MAX_DELAY: Duration = Duration::from_secs(60);
const RATE_LIMIT_MAX_RETRIES: usize = 6;

// ────────────────────────────────────────────────────────────────────────────
// Wire shapes
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChannelObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageObject {
    id: String,
    #[serde(default)]
    content: String,
    author: Option<AuthorObject>,
    timestamp: Option<String>,
    poll: Option<PollObject>,
}

#[derive(Debug, Deserialize)]
struct AuthorObject {
    #[serde(default)]
    username: String,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct PollObject {
    #[serde(default)]
    answers: Vec<PollAnswerObject>,
    results: Option<PollResultsObject>,
}

#[derive(Debug, Deserialize)]
struct PollAnswerObject {
    answer_id: u64,
    poll_media: PollMediaObject,
}

#[derive(Debug, Deserialize)]
struct PollMediaObject {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct PollResultsObject {
    #[serde(default)]
    answer_counts: Vec<AnswerCountObject>,
}

#[derive(Debug, Deserialize)]
struct AnswerCountObject {
    id: u64,
    count: u64,
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// Chat adapter over the Discord REST API.
pub struct DiscordClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl DiscordClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, DISCORD_API_BASE)
    }

    /// Point the client at a different host (for testing).
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Create a public thread, post the body, and attach the poll
    ///
    /// Three wire calls, each retried on rate limit. A crash between them
    /// leaves a thread without a recorded poll; the caller's lifecycle store
    /// treats that proposal as not yet posted.
    pub async fn create_thread_with_poll(
        &self,
        channel_id: u64,
        title: &str,
        body: &str,
        poll: &PollRequest,
    ) -> Result<ThreadPost> {
        validate_poll(poll)?;

        let name = thread_name(title);
        let thread = retry_rate_limited(|| self.request_create_thread(channel_id, &name)).await?;
        let thread_id = parse_snowflake(&thread.id)?;

        retry_rate_limited(|| self.request_post_content(thread_id, body)).await?;

        let poll_message = retry_rate_limited(|| self.request_post_poll(thread_id, poll)).await?;
        let poll_message_id = parse_snowflake(&poll_message.id)?;

        tracing::info!(
            channel_id,
            thread_id,
            poll_message_id,
            "Created proposal thread with poll"
        );
        Ok(ThreadPost {
            thread_id,
            poll_message_id,
        })
    }

    /// Read the tally from a poll message
    ///
    /// Discord keys counts by answer id and omits untouched answers; the
    /// result here carries one entry per answer in display order, zero for
    /// anything omitted.
    pub async fn poll_results(
        &self,
        thread_id: u64,
        poll_message_id: u64,
    ) -> Result<Vec<OptionCount>> {
        let message =
            retry_rate_limited(|| self.request_get_message(thread_id, poll_message_id)).await?;
        let poll = message
            .poll
            .ok_or_else(|| ChatError::invalid_response("message carries no poll"))?;

        let counts = poll.results.map(|r| r.answer_counts).unwrap_or_default();
        Ok(poll
            .answers
            .into_iter()
            .map(|answer| {
                let votes = counts
                    .iter()
                    .find(|c| c.id == answer.answer_id)
                    .map(|c| c.count)
                    .unwrap_or(0);
                OptionCount {
                    text: answer.poll_media.text,
                    votes,
                }
            })
            .collect())
    }

    /// Post a plain message to a thread
    pub async fn post_message(&self, thread_id: u64, text: &str) -> Result<u64> {
        let message = retry_rate_limited(|| self.request_post_content(thread_id, text)).await?;
        parse_snowflake(&message.id)
    }

    /// All messages in a thread with ids above `after`, ascending;
    /// `None` sweeps the whole thread from its first message
    pub async fn thread_messages_after(
        &self,
        thread_id: u64,
        after: Option<u64>,
    ) -> Result<Vec<ThreadMessage>> {
        let mut messages = Vec::new();
        // Snowflakes start above zero, so zero anchors at the thread start
        let mut cursor = after.unwrap_or(0);

        loop {
            let page = retry_rate_limited(|| self.request_message_page(thread_id, cursor)).await?;
            let page_len = page.len();

            let mut max_id = None;
            for raw in page {
                let Ok(id) = raw.id.parse::<u64>() else {
                    tracing::debug!(thread_id, raw_id = %raw.id, "Skipping message with unparseable id");
                    continue;
                };
                max_id = Some(max_id.map_or(id, |m: u64| m.max(id)));
                if let Some(message) = convert_message(id, raw) {
                    messages.push(message);
                }
            }

            if page_len < MESSAGE_PAGE_LIMIT {
                break;
            }
            // Stop if the page could not advance the cursor
            let Some(next) = max_id else { break };
            if next == cursor {
                break;
            }
            cursor = next;
        }

        messages.sort_by_key(|m| m.id);
        Ok(messages)
    }

    // ────────────────────────────────────────────────────────────────────
    // Request primitives
    // ────────────────────────────────────────────────────────────────────

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bot {}", self.token),
            )
            .header(reqwest::header::USER_AGENT, USER_AGENT_VALUE)
    }

    async fn request_create_thread(&self, channel_id: u64, name: &str) -> Result<ChannelObject> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/channels/{channel_id}/threads"),
            )
            .json(&json!({
                "name": name,
                "type": CHANNEL_TYPE_PUBLIC_THREAD,
                "auto_archive_duration": THREAD_AUTO_ARCHIVE_MINUTES,
            }))
            .send()
            .await
            .map_err(|e| ChatError::transport_with_source("thread create request failed", e))?;
        read_json(response).await
    }

    async fn request_post_content(&self, channel_id: u64, content: &str) -> Result<MessageObject> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/channels/{channel_id}/messages"),
            )
            .json(&json!({ "content": content }))
            .send()
            .await
            .map_err(|e| ChatError::transport_with_source("message post request failed", e))?;
        read_json(response).await
    }

    async fn request_post_poll(&self, thread_id: u64, poll: &PollRequest) -> Result<MessageObject> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/channels/{thread_id}/messages"),
            )
            .json(&json!({ "poll": poll_payload(poll) }))
            .send()
            .await
            .map_err(|e| ChatError::transport_with_source("poll post request failed", e))?;
        read_json(response).await
    }

    async fn request_get_message(
        &self,
        channel_id: u64,
        message_id: u64,
    ) -> Result<MessageObject> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/channels/{channel_id}/messages/{message_id}"),
            )
            .send()
            .await
            .map_err(|e| ChatError::transport_with_source("message fetch request failed", e))?;
        read_json(response).await
    }

    async fn request_message_page(
        &self,
        channel_id: u64,
        after: u64,
    ) -> Result<Vec<MessageObject>> {
        // `after` is always sent: without it the endpoint returns the newest
        // window and everything older is never paged in
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/channels/{channel_id}/messages"),
            )
            .query(&[
                ("limit", MESSAGE_PAGE_LIMIT.to_string()),
                ("after", after.to_string()),
            ])
            .send()
            .await
            .map_err(|e| ChatError::transport_with_source("message page request failed", e))?;
        read_json(response).await
    }
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    async fn create_thread_with_poll(
        &self,
        channel_id: u64,
        title: &str,
        body: &str,
        poll: &PollRequest,
    ) -> Result<ThreadPost> {
        DiscordClient::create_thread_with_poll(self, channel_id, title, body, poll).await
    }

    async fn poll_results(
        &self,
        thread_id: u64,
        poll_message_id: u64,
    ) -> Result<Vec<OptionCount>> {
        DiscordClient::poll_results(self, thread_id, poll_message_id).await
    }

    async fn post_message(&self, thread_id: u64, text: &str) -> Result<u64> {
        DiscordClient::post_message(self, thread_id, text).await
    }

    async fn thread_messages_after(
        &self,
        thread_id: u64,
        after: Option<u64>,
    ) -> Result<Vec<ThreadMessage>> {
        DiscordClient::thread_messages_after(self, thread_id, after).await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

/// Retry an operation on rate limit, with bounded exponential backoff
async fn retry_rate_limited<T, Fut, F>(op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let backoff = ExponentialBuilder::default()
        .with_min_delay(RATE_LIMIT_MIN_DELAY)
        .with_max_delay(RATE_LIMIT_MAX_DELAY)
        .with_factor(2.0)
        .with_max_times(RATE_LIMIT_MAX_RETRIES);

    op.retry(backoff)
        .when(|err: &ChatError| matches!(err, ChatError::RateLimited))
        .await
}

/// Map the response status, then decode the JSON body
async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        tracing::debug!("Chat API rate limited, backing off");
        return Err(ChatError::RateLimited);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ChatError::api(status.as_u16(), body));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ChatError::invalid_response(format!("invalid JSON body: {e}")))
}

/// Discord sends snowflakes as strings; ids are u64 internally
fn parse_snowflake(raw: &str) -> Result<u64> {
    raw.parse::<u64>()
        .map_err(|_| ChatError::invalid_response(format!("invalid snowflake: {raw:?}")))
}

/// Thread names are clamped to the platform limit
fn thread_name(title: &str) -> String {
    title.chars().take(THREAD_NAME_MAX_CHARS).collect()
}

/// Poll lifetimes are whole hours on the wire; round up, then clamp
fn poll_duration_hours(minutes: u32) -> u32 {
    minutes.div_ceil(60).clamp(MIN_POLL_HOURS, MAX_POLL_HOURS)
}

fn validate_poll(poll: &PollRequest) -> Result<()> {
    if poll.question.trim().is_empty() {
        return Err(ChatError::invalid_request("poll question is empty"));
    }
    if poll.question.chars().count() > POLL_QUESTION_MAX_CHARS {
        return Err(ChatError::invalid_request(format!(
            "poll question exceeds {POLL_QUESTION_MAX_CHARS} characters"
        )));
    }
    if poll.options.is_empty() {
        return Err(ChatError::invalid_request("poll has no answers"));
    }
    if poll.options.len() > MAX_POLL_ANSWERS {
        return Err(ChatError::invalid_request(format!(
            "poll has {} answers, limit is {MAX_POLL_ANSWERS}",
            poll.options.len()
        )));
    }
    for option in &poll.options {
        if option.text.trim().is_empty() {
            return Err(ChatError::invalid_request("poll answer text is empty"));
        }
        if option.text.chars().count() > POLL_ANSWER_MAX_CHARS {
            return Err(ChatError::invalid_request(format!(
                "poll answer {:?} exceeds {POLL_ANSWER_MAX_CHARS} characters",
                option.text
            )));
        }
    }
    if poll.duration_minutes == 0 {
        return Err(ChatError::invalid_request("poll duration is zero"));
    }
    Ok(())
}

fn poll_payload(poll: &PollRequest) -> Value {
    let answers: Vec<Value> = poll
        .options
        .iter()
        .map(|option| {
            let mut media = json!({ "text": option.text });
            if let Some(emoji) = &option.emoji {
                media["emoji"] = json!({ "name": emoji });
            }
            json!({ "poll_media": media })
        })
        .collect();

    json!({
        "question": { "text": poll.question },
        "answers": answers,
        "duration": poll_duration_hours(poll.duration_minutes),
        "allow_multiselect": false,
    })
}

fn convert_message(id: u64, raw: MessageObject) -> Option<ThreadMessage> {
    let Some(author) = raw.author else {
        tracing::debug!(id, "Skipping message without author");
        return None;
    };
    let created_at = match raw.timestamp.as_deref().map(DateTime::parse_from_rfc3339) {
        Some(Ok(ts)) => ts.with_timezone(&Utc),
        _ => {
            tracing::debug!(id, "Skipping message without valid timestamp");
            return None;
        }
    };

    Some(ThreadMessage {
        id,
        author: author.username,
        author_is_bot: author.bot,
        text: raw.content,
        created_at,
    })
}
