//! Proposal payloads as they cross the feed boundary
//!
//! Upstream indexers are loose about field names, so identity fields are
//! pulled through a validating wire struct with aliases; everything else
//! rides along as the opaque `raw` payload for storage and prompting.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Governance action identity, `"{tx_hash}#{index}"` in display form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GovActionId {
    pub tx_hash: String,
    pub index: u32,
}

impl GovActionId {
    /// Identifier form used by the AdaStat explorer (no separator)
    pub fn adastat_id(&self) -> String {
        format!("{}{}", self.tx_hash, self.index)
    }
}

impl fmt::Display for GovActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_hash, self.index)
    }
}

/// Identity and scheduling fields, validated at the boundary.
///
/// Field-name aliases cover the variants seen across indexer versions.
#[derive(Debug, Deserialize)]
struct WireProposal {
    #[serde(alias = "proposal_tx_hash", alias = "proposal_hash")]
    tx_hash: Option<String>,
    #[serde(alias = "proposal_index", alias = "gov_action_index")]
    index: Option<u32>,
    block_time: Option<i64>,
    proposal_type: Option<String>,
    meta_url: Option<String>,
    meta_hash: Option<String>,
}

/// A proposal as returned by the feed.
///
/// `raw` is the complete upstream payload; it is persisted verbatim and fed
/// to the summarizer, so nothing is stripped from it here.
#[derive(Debug, Clone)]
pub struct FeedProposal {
    pub gaid: GovActionId,
    /// Chain timestamp, unix seconds; drives the discovery watermark
    pub block_time: i64,
    pub proposal_type: Option<String>,
    pub meta_url: Option<String>,
    pub meta_hash: Option<String>,
    pub raw: Value,
}

impl FeedProposal {
    /// Parse one feed item, returning `None` for items without a derivable
    /// identity or chain timestamp (both are logged and skipped rather than
    /// failing the whole page).
    pub fn from_value(raw: Value) -> Option<Self> {
        let wire: WireProposal = match serde_json::from_value(raw.clone()) {
            Ok(wire) => wire,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unparsable feed item");
                return None;
            }
        };

        let Some(tx_hash) = wire.tx_hash else {
            tracing::debug!("Skipping feed item without a tx hash");
            return None;
        };
        let gaid = GovActionId {
            tx_hash,
            index: wire.index.unwrap_or(0),
        };

        let Some(block_time) = wire.block_time else {
            tracing::warn!(gaid = %gaid, "Proposal has no block_time, skipping");
            return None;
        };

        Some(Self {
            gaid,
            block_time,
            proposal_type: wire.proposal_type,
            meta_url: wire.meta_url,
            meta_hash: wire.meta_hash,
            raw,
        })
    }

    /// The off-chain metadata document, if the feed inlined one
    pub fn meta_json(&self) -> Option<&Value> {
        self.raw.get("meta_json").filter(|v| !v.is_null())
    }

    /// Attach a separately fetched metadata document to the payload
    pub fn set_meta_json(&mut self, meta: Value) {
        if let Value::Object(map) = &mut self.raw {
            map.insert("meta_json".to_string(), meta);
        }
    }

    /// Best available human title
    ///
    /// Preference order: metadata body title, top-level title field, a label
    /// derived from the action type, then a generic fallback.
    pub fn title(&self) -> String {
        if let Some(title) = self
            .raw
            .pointer("/meta_json/body/title")
            .and_then(Value::as_str)
            && !title.is_empty()
        {
            return title.to_string();
        }

        if let Some(title) = self.raw.get("title").and_then(Value::as_str)
            && !title.is_empty()
        {
            return title.to_string();
        }

        match &self.proposal_type {
            Some(kind) => format!("Governance Action: {kind}"),
            None => "Governance Action".to_string(),
        }
    }
}
