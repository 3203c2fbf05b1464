//! Governance feed client for the relay bot
//!
//! Wraps the external governance data API behind two operations the
//! controller needs: discovery (`fetch_since` a watermark) and best-effort
//! metadata enrichment (`fetch_metadata` with integrity checks). Payload
//! identity is validated here at the boundary; the rest of each payload
//! stays opaque.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod client;
pub mod errors;
pub mod proposal;

pub use client::{KoiosClient, ProposalSource};
pub use errors::{FeedError, Result};
pub use proposal::{FeedProposal, GovActionId};
