//! Koios-style governance feed client
//!
//! Talks to a PostgREST-flavoured indexer: `proposal_list` with
//! `block_time=gt.{ts}` filtering and limit/offset pagination. The upstream
//! filter is treated as advisory; results are re-filtered and re-sorted
//! client-side so callers always get strictly-newer proposals in ascending
//! chain order.

use crate::errors::{FeedError, Result};
use crate::proposal::FeedProposal;
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Page size for proposal_list pagination
const PAGE_SIZE: usize = 50;

/// Per-request timeout for proposal pages
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-request timeout for metadata documents
const META_TIMEOUT: Duration = Duration::from_secs(10);

/// Metadata documents larger than this are rejected unread
const META_MAX_BYTES: usize = 1_000_000;

/// Rate-limit backoff: 1s doubling up to 60s, bounded attempts
const RATE_LIMIT_MIN_DELAY: Duration = Duration::from_secs(1);
const RATE_LIMIT_MAX_DELAY: Duration = Duration::from_secs(60);
const RATE_LIMIT_MAX_RETRIES: usize = 6;

/// Source of governance proposals, seam for the controller.
#[async_trait]
pub trait ProposalSource: Send + Sync {
    /// Proposals strictly newer than the watermark, ascending by block_time
    async fn fetch_since(&self, after_block_time: Option<i64>) -> Result<Vec<FeedProposal>>;

    /// Best-effort fetch of an off-chain metadata document
    ///
    /// Any failure or integrity rejection yields `None`; metadata never
    /// blocks a proposal from being processed.
    async fn fetch_metadata(&self, url: &str, expected_hash: Option<&str>) -> Option<Value>;
}

/// Feed client over the Koios REST API.
pub struct KoiosClient {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl KoiosClient {
    pub fn new(base_url: impl Into<String>, api_token: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch all proposals newer than `after_block_time`
    ///
    /// Pages through the feed until a short page, then filters and sorts
    /// locally. Items without identity or block_time are skipped inside
    /// `FeedProposal::from_value`.
    pub async fn fetch_since(&self, after_block_time: Option<i64>) -> Result<Vec<FeedProposal>> {
        let mut proposals = Vec::new();
        let mut offset = 0usize;

        loop {
            let page = self.fetch_page(after_block_time, offset).await?;
            let page_len = page.len();

            proposals.extend(page.into_iter().filter_map(FeedProposal::from_value));

            if page_len < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }

        // The upstream filter is advisory; enforce strictly-newer here
        if let Some(watermark) = after_block_time {
            proposals.retain(|p| p.block_time > watermark);
        }
        proposals.sort_by(|a, b| {
            a.block_time
                .cmp(&b.block_time)
                .then_with(|| a.gaid.tx_hash.cmp(&b.gaid.tx_hash))
                .then_with(|| a.gaid.index.cmp(&b.gaid.index))
        });

        tracing::debug!(
            count = proposals.len(),
            after_block_time,
            "Fetched proposals from feed"
        );
        Ok(proposals)
    }

    /// One page, with in-call backoff on HTTP 429
    async fn fetch_page(&self, after_block_time: Option<i64>, offset: usize) -> Result<Vec<Value>> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(RATE_LIMIT_MIN_DELAY)
            .with_max_delay(RATE_LIMIT_MAX_DELAY)
            .with_factor(2.0)
            .with_max_times(RATE_LIMIT_MAX_RETRIES);

        (|| self.request_page(after_block_time, offset))
            .retry(backoff)
            .when(|err: &FeedError| matches!(err, FeedError::RateLimited))
            .await
    }

    async fn request_page(&self, after_block_time: Option<i64>, offset: usize) -> Result<Vec<Value>> {
        let url = format!("{}/proposal_list", self.base_url);

        let mut request = self
            .client
            .get(&url)
            .timeout(FETCH_TIMEOUT)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[
                ("limit", PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ]);

        if let Some(ts) = after_block_time {
            request = request.query(&[("block_time", format!("gt.{ts}"))]);
        }
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FeedError::unavailable_with_source("feed request failed", e))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            tracing::debug!(offset, "Feed rate limited, backing off");
            return Err(FeedError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::unavailable(format!(
                "feed returned HTTP {status}: {body}"
            )));
        }

        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| FeedError::malformed_with_source("feed returned invalid JSON", e))
    }

    /// Fetch and verify an off-chain metadata document
    ///
    /// Rejects non-JSON content types, oversized bodies, and hash mismatches.
    /// All failures collapse to `None`: the proposal is still processed, just
    /// without enrichment.
    pub async fn fetch_metadata(&self, url: &str, expected_hash: Option<&str>) -> Option<Value> {
        let response = match self
            .client
            .get(url)
            .timeout(META_TIMEOUT)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                tracing::debug!(url, error = %e, "Metadata fetch failed");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::debug!(url, status = %response.status(), "Metadata fetch failed");
            return None;
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !content_type.contains("application/json") {
            tracing::debug!(url, content_type, "Rejected metadata: not JSON");
            return None;
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(url, error = %e, "Metadata read failed");
                return None;
            }
        };

        if body.len() > META_MAX_BYTES {
            tracing::debug!(url, len = body.len(), "Rejected metadata: too large");
            return None;
        }

        if let Some(expected) = expected_hash {
            let actual = sha256_hex(&body);
            if !actual.eq_ignore_ascii_case(expected) {
                tracing::debug!(url, "Rejected metadata: hash mismatch");
                return None;
            }
        }

        match serde_json::from_slice(&body) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(url, error = %e, "Rejected metadata: invalid JSON");
                None
            }
        }
    }
}

#[async_trait]
impl ProposalSource for KoiosClient {
    async fn fetch_since(&self, after_block_time: Option<i64>) -> Result<Vec<FeedProposal>> {
        KoiosClient::fetch_since(self, after_block_time).await
    }

    async fn fetch_metadata(&self, url: &str, expected_hash: Option<&str>) -> Option<Value> {
        KoiosClient::fetch_metadata(self, url, expected_hash).await
    }
}

/// SHA-256 of the bytes as lowercase hex
fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
