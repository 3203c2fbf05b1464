//! Row types for the lifecycle store

use chrono::{DateTime, Utc};
use std::fmt;

/// Lifecycle status of a tracked proposal.
///
/// Transitions are strictly forward:
/// `Discovered -> Posted -> AwaitingClose -> Finalized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalStatus {
    /// Seen in the feed and recorded, not yet announced
    Discovered,
    /// Thread and poll created on the platform
    Posted,
    /// Voting window open, waiting for `poll_end_at`
    AwaitingClose,
    /// Results gathered and published; terminal
    Finalized,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Posted => "posted",
            Self::AwaitingClose => "awaiting_close",
            Self::Finalized => "finalized",
        }
    }

    /// Parse from string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "discovered" => Some(Self::Discovered),
            "posted" => Some(Self::Posted),
            "awaiting_close" => Some(Self::AwaitingClose),
            "finalized" => Some(Self::Finalized),
            _ => None,
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row from the proposals table
#[derive(Debug, Clone)]
pub struct ProposalRecord {
    /// Governance action id, `"{tx_hash}#{index}"`
    pub gaid: String,
    pub title: String,
    /// Opaque feed payload, serialized JSON
    pub raw_metadata: String,
    /// Chain block_time, unix seconds
    pub discovered_at: i64,
    pub thread_id: Option<u64>,
    pub poll_message_id: Option<u64>,
    pub posted_at: Option<DateTime<Utc>>,
    pub poll_end_at: Option<DateTime<Utc>>,
    pub final_vote: Option<String>,
    pub final_rationale: Option<String>,
    pub status: ProposalStatus,
}

/// A row from the rationales table
#[derive(Debug, Clone)]
pub struct RationaleRecord {
    pub id: i64,
    pub gaid: String,
    /// Platform message snowflake; unique, so replayed sweeps are no-ops
    pub message_id: u64,
    pub author: String,
    pub text: String,
    pub submitted_at: DateTime<Utc>,
}

/// Per-status row counts, for startup/resume logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub discovered: i64,
    pub posted: i64,
    pub awaiting_close: i64,
    pub finalized: i64,
}

impl StatusCounts {
    pub fn non_terminal(&self) -> i64 {
        self.discovered + self.posted + self.awaiting_close
    }
}
