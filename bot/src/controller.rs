//! Lifecycle controller
//!
//! Runs the discovery and closure passes on a fixed cadence. Each pass is
//! crash-tolerant around a single ordering rule: a proposal is recorded in
//! the store before its thread goes up, and the watermark only advances once
//! the thread is recorded. A crash can therefore re-post at most the
//! proposals that were mid-flight, and the store's transition guards keep
//! even those from ever holding two thread/poll pairs. Discovery repairs
//! leftovers first: rows still `discovered` are posted again, rows stuck at
//! `posted` get their voting window so closure can reach them.

use crate::config::BotConfig;
use crate::format;
use crate::listener::rationale_text;
use crate::poll::{VoteTally, poll_request};
use agora_chat::ChatPlatform;
use agora_feed::{FeedProposal, ProposalSource};
use agora_store::{ProposalRecord, ProposalStatus, RationaleRecord, Store};
use agora_summarizer::{Summarizer, proposal_prompt, rationale_prompt};
use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Pause between proposal posts within one pass
const POST_PACING: Duration = Duration::from_secs(2);

/// Pause between poll closures within one pass
const CLOSE_PACING: Duration = Duration::from_secs(1);

/// Announcement digest used when the summarizer is down
const SUMMARY_FALLBACK: &str =
    "AI summary generation failed. Please check the proposal details below.";

/// Results digest used when nobody submitted a rationale
const NO_RATIONALES_FALLBACK: &str = "No rationales provided by the community.";

/// Controller knobs, extracted from the full bot configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub channel_id: u64,
    pub poll_duration_minutes: u32,
    pub koios_base_url: String,
    pub initial_block_time: Option<i64>,
    pub poll_interval: Duration,
}

impl From<&BotConfig> for ControllerConfig {
    fn from(config: &BotConfig) -> Self {
        Self {
            channel_id: config.discord_channel_id,
            poll_duration_minutes: config.poll_duration_minutes,
            koios_base_url: config.koios_base_url.clone(),
            initial_block_time: config.initial_block_time,
            poll_interval: config.poll_interval,
        }
    }
}

/// Drives proposals through discovery, posting, and closure.
pub struct Controller<F, S, C> {
    store: Arc<Store>,
    feed: F,
    summarizer: S,
    chat: Arc<C>,
    config: ControllerConfig,
}

impl<F, S, C> Controller<F, S, C>
where
    F: ProposalSource,
    S: Summarizer,
    C: ChatPlatform,
{
    pub fn new(
        store: Arc<Store>,
        feed: F,
        summarizer: S,
        chat: Arc<C>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            store,
            feed,
            summarizer,
            chat,
            config,
        }
    }

    /// One full cycle: post anything new, then close anything expired.
    pub async fn run_cycle(&self) {
        if let Err(err) = self.discovery_pass().await {
            tracing::error!(error = %err, "Discovery pass failed");
        }
        if let Err(err) = self.closure_pass().await {
            tracing::error!(error = %err, "Closure pass failed");
        }
    }

    /// Run cycles on the configured interval until shutdown flips.
    ///
    /// The first cycle starts immediately; a cycle that overruns the
    /// interval just delays the next tick instead of stacking.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("Controller shutting down");
                        return;
                    }
                }
            }
        }
    }

    // ────────────────────────────────────────────────────────────────────
    // Discovery
    // ────────────────────────────────────────────────────────────────────

    /// Post new proposals: resume anything stuck from a previous run, then
    /// pull the feed from the watermark.
    pub async fn discovery_pass(&self) -> Result<()> {
        let mut handled: HashSet<String> = HashSet::new();
        let mut posted = 0usize;

        // Rows whose thread went up but whose voting window was never
        // recorded; closure only lists awaiting_close, so set the window
        // from when the thread was posted
        let stranded = self.store.list_proposals(ProposalStatus::Posted).await?;
        for record in stranded {
            let Some(posted_at) = record.posted_at else {
                tracing::warn!(gaid = %record.gaid, "Posted row without a posted_at, skipping");
                continue;
            };
            let poll_end = posted_at
                + chrono::Duration::minutes(i64::from(self.config.poll_duration_minutes));
            match self.store.mark_awaiting_close(&record.gaid, poll_end).await {
                Ok(()) => {
                    tracing::info!(gaid = %record.gaid, poll_end = %poll_end, "Resumed posted proposal");
                }
                Err(err) => {
                    tracing::error!(gaid = %record.gaid, error = %err, "Failed to resume posted proposal");
                }
            }
        }

        // Rows a previous run discovered but never finished posting
        let stuck = self
            .store
            .list_proposals(ProposalStatus::Discovered)
            .await?;
        for record in stuck {
            handled.insert(record.gaid.clone());

            let rebuilt = serde_json::from_str::<Value>(&record.raw_metadata)
                .ok()
                .and_then(FeedProposal::from_value);
            let Some(mut proposal) = rebuilt else {
                tracing::warn!(gaid = %record.gaid, "Stored proposal no longer parses, skipping");
                continue;
            };

            self.enrich(&mut proposal).await;
            match self.post_proposal(&proposal).await {
                Ok(()) => posted += 1,
                Err(err) => {
                    tracing::error!(gaid = %record.gaid, error = %err, "Failed to post resumed proposal");
                }
            }
            tokio::time::sleep(POST_PACING).await;
        }

        // Fresh proposals from the feed, strictly above the watermark
        let watermark = self
            .store
            .get_watermark()
            .await?
            .or(self.config.initial_block_time);
        let proposals = self.feed.fetch_since(watermark).await?;

        for mut proposal in proposals {
            let gaid = proposal.gaid.to_string();
            if handled.contains(&gaid) {
                continue;
            }

            self.enrich(&mut proposal).await;

            let inserted = self
                .store
                .insert_discovered(
                    &gaid,
                    &proposal.title(),
                    &serde_json::to_string(&proposal.raw)?,
                    proposal.block_time,
                )
                .await?;
            if !inserted
                && let Some(known) = self.store.get_proposal(&gaid).await?
                && known.status != ProposalStatus::Discovered
            {
                // Re-offered by the feed after a crash between posting and
                // advancing the watermark; heal the watermark and move on
                tracing::debug!(gaid = %gaid, status = %known.status, "Already posted, skipping");
                self.store.advance_watermark(proposal.block_time).await?;
                continue;
            }

            match self.post_proposal(&proposal).await {
                Ok(()) => posted += 1,
                Err(err) => {
                    tracing::error!(gaid = %gaid, error = %err, "Failed to post proposal");
                }
            }
            tokio::time::sleep(POST_PACING).await;
        }

        if posted > 0 {
            tracing::info!(posted, "Discovery pass complete");
        }
        Ok(())
    }

    /// Attach off-chain metadata when the feed didn't inline it.
    async fn enrich(&self, proposal: &mut FeedProposal) {
        if proposal.meta_json().is_some() {
            return;
        }
        let Some(url) = proposal.meta_url.as_deref() else {
            return;
        };
        let meta = self
            .feed
            .fetch_metadata(url, proposal.meta_hash.as_deref())
            .await;
        if let Some(meta) = meta {
            proposal.set_meta_json(meta);
        }
    }

    /// Summarize, announce, and record one proposal.
    async fn post_proposal(&self, proposal: &FeedProposal) -> Result<()> {
        let gaid = proposal.gaid.to_string();

        let prompt = proposal_prompt(&format::reduced_metadata(proposal));
        let summary = match self.summarizer.summarize(&prompt).await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(gaid = %gaid, error = %err, "Proposal digest failed, using fallback");
                SUMMARY_FALLBACK.to_string()
            }
        };

        let title = format::thread_title(&proposal.title(), &proposal.gaid);
        let body = format::announcement(proposal, &summary, &self.config.koios_base_url);
        let poll = poll_request(self.config.poll_duration_minutes);

        let post = self
            .chat
            .create_thread_with_poll(self.config.channel_id, &title, &body, &poll)
            .await?;

        let now = Utc::now();
        self.store
            .record_posted(&gaid, post.thread_id, post.poll_message_id, now)
            .await?;
        let poll_end = now + chrono::Duration::minutes(i64::from(self.config.poll_duration_minutes));
        self.store.mark_awaiting_close(&gaid, poll_end).await?;
        self.store.advance_watermark(proposal.block_time).await?;

        tracing::info!(
            gaid = %gaid,
            thread_id = post.thread_id,
            poll_end = %poll_end,
            "Posted proposal"
        );
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────
    // Closure
    // ────────────────────────────────────────────────────────────────────

    /// Close every poll whose voting window has ended.
    pub async fn closure_pass(&self) -> Result<()> {
        let now = Utc::now();
        let awaiting = self
            .store
            .list_proposals(ProposalStatus::AwaitingClose)
            .await?;

        let mut finalized = 0usize;
        for record in awaiting {
            let Some(poll_end_at) = record.poll_end_at else {
                tracing::warn!(gaid = %record.gaid, "Open proposal without a poll end, skipping");
                continue;
            };
            if poll_end_at > now {
                continue;
            }

            match self.close_proposal(&record).await {
                Ok(()) => finalized += 1,
                Err(err) => {
                    tracing::error!(gaid = %record.gaid, error = %err, "Failed to close poll");
                }
            }
            tokio::time::sleep(CLOSE_PACING).await;
        }

        if finalized > 0 {
            tracing::info!(finalized, "Closure pass complete");
        }
        Ok(())
    }

    /// Tally one expired poll, post the results digest, and finalize.
    async fn close_proposal(&self, record: &ProposalRecord) -> Result<()> {
        let (Some(thread_id), Some(poll_message_id)) = (record.thread_id, record.poll_message_id)
        else {
            anyhow::bail!("proposal {} is open without platform ids", record.gaid);
        };

        // Catch-up sweep so rationales posted since the last listener pass
        // still make the digest; the store absorbs replays by message id
        let messages = self.chat.thread_messages_after(thread_id, None).await?;
        for message in &messages {
            if message.author_is_bot {
                continue;
            }
            let Some(text) = rationale_text(&message.text) else {
                continue;
            };
            self.store
                .append_rationale(
                    &record.gaid,
                    message.id,
                    &message.author,
                    &text,
                    message.created_at,
                )
                .await?;
        }

        let counts = self.chat.poll_results(thread_id, poll_message_id).await?;
        let tally = VoteTally::from_counts(&counts);
        let outcome = tally.outcome();

        let rationales = self.store.list_rationales(&record.gaid).await?;
        let summary = self
            .rationale_summary(&record.gaid, &tally, &rationales)
            .await;

        let results = format::results_message(&tally, &summary);
        self.chat.post_message(thread_id, &results).await?;

        self.store
            .mark_finalized(&record.gaid, outcome, Some(&summary))
            .await?;

        tracing::info!(
            gaid = %record.gaid,
            outcome,
            total_votes = tally.total(),
            rationales = rationales.len(),
            "Finalized proposal"
        );
        Ok(())
    }

    /// Digest of community rationales, with fixed fallbacks when there is
    /// nothing to digest or the summarizer is down.
    async fn rationale_summary(
        &self,
        gaid: &str,
        tally: &VoteTally,
        rationales: &[RationaleRecord],
    ) -> String {
        if rationales.is_empty() {
            return NO_RATIONALES_FALLBACK.to_string();
        }

        let entries: Vec<(String, String)> = rationales
            .iter()
            .map(|r| (r.author.clone(), r.text.clone()))
            .collect();
        let prompt = rationale_prompt(
            tally.outcome(),
            tally.outcome_votes(),
            tally.total(),
            &entries,
        );

        match self.summarizer.summarize(&prompt).await {
            Ok(text) => format::truncate_chars(&text, format::SUMMARY_MAX_CHARS),
            Err(err) => {
                tracing::warn!(gaid, error = %err, "Rationale digest failed, using fallback");
                format!(
                    "The community voted {} based on {} submitted rationales.",
                    tally.outcome(),
                    rationales.len()
                )
            }
        }
    }
}
