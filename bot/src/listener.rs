//! Rationale capture
//!
//! Open proposal threads are swept on a short interval for community
//! rationale comments. Capture is deliberately strict: the comment must
//! start with the exact `RATIONAL:` prefix, bot-authored messages never
//! count, and replays are absorbed by the store's message-id key rather
//! than tracked here. The in-memory cursors only save bandwidth; losing
//! them (on restart) just means one wider sweep.

use agora_chat::ChatPlatform;
use agora_store::{ProposalStatus, Store};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// How often open threads are swept for new replies
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A comment only counts as a rationale with this exact prefix
pub const RATIONALE_PREFIX: &str = "RATIONAL:";

/// Extract the rationale body from a comment.
///
/// `None` unless the text starts with the exact prefix and carries something
/// after it. Case variants and mid-message occurrences don't count.
pub fn rationale_text(text: &str) -> Option<String> {
    let rest = text.strip_prefix(RATIONALE_PREFIX)?.trim();
    if rest.is_empty() {
        return None;
    }
    Some(rest.to_string())
}

/// Periodic sweeper for rationale comments in open threads.
pub struct RationaleListener<C> {
    store: Arc<Store>,
    chat: Arc<C>,
    /// Last message id seen per thread, to keep sweeps incremental
    cursors: Mutex<HashMap<u64, u64>>,
}

impl<C: ChatPlatform> RationaleListener<C> {
    pub fn new(store: Arc<Store>, chat: Arc<C>) -> Self {
        Self {
            store,
            chat,
            cursors: Mutex::new(HashMap::new()),
        }
    }

    /// Sweep every open proposal thread once; returns rationales stored.
    pub async fn sweep_once(&self) -> anyhow::Result<usize> {
        let open = self
            .store
            .list_proposals(ProposalStatus::AwaitingClose)
            .await?;

        let mut stored_total = 0;
        for record in open {
            let Some(thread_id) = record.thread_id else {
                continue;
            };
            match self.sweep_thread(&record.gaid, thread_id).await {
                Ok(stored) => stored_total += stored,
                Err(err) => {
                    tracing::warn!(gaid = %record.gaid, error = %err, "Thread sweep failed");
                }
            }
        }
        Ok(stored_total)
    }

    async fn sweep_thread(&self, gaid: &str, thread_id: u64) -> anyhow::Result<usize> {
        let after = { self.cursors.lock().await.get(&thread_id).copied() };
        let messages = self.chat.thread_messages_after(thread_id, after).await?;

        let mut stored = 0;
        let mut last_id = None;
        for message in &messages {
            // Messages arrive ascending; the final id becomes the cursor
            last_id = Some(message.id);

            if message.author_is_bot {
                continue;
            }
            let Some(text) = rationale_text(&message.text) else {
                continue;
            };
            if self
                .store
                .append_rationale(gaid, message.id, &message.author, &text, message.created_at)
                .await?
            {
                stored += 1;
                tracing::info!(gaid, author = %message.author, "Captured rationale");
            }
        }

        if let Some(id) = last_id {
            self.cursors.lock().await.insert(thread_id, id);
        }
        Ok(stored)
    }

    /// Sweep on an interval until shutdown flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep_once().await {
                        tracing::warn!(error = %err, "Rationale sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("Rationale listener shutting down");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_prefix_is_required() {
        assert_eq!(
            rationale_text("RATIONAL: keep it simple"),
            Some("keep it simple".to_string())
        );
        assert_eq!(
            rationale_text("RATIONAL:no space after colon"),
            Some("no space after colon".to_string())
        );

        assert_eq!(rationale_text("rational: lowercase"), None);
        assert_eq!(rationale_text("Rational: mixed case"), None);
        assert_eq!(rationale_text("I think RATIONAL: embedded"), None);
        assert_eq!(rationale_text(" RATIONAL: leading space"), None);
    }

    #[test]
    fn test_empty_rationale_is_dropped() {
        assert_eq!(rationale_text("RATIONAL:"), None);
        assert_eq!(rationale_text("RATIONAL:    "), None);
    }

    #[test]
    fn test_body_is_trimmed() {
        assert_eq!(
            rationale_text("RATIONAL:   padded on both sides   "),
            Some("padded on both sides".to_string())
        );
    }
}
