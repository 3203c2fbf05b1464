//! Lifecycle store for the governance relay bot
//!
//! Owns the SQLite database that makes the bot restart-safe:
//! - Proposal rows with a strictly forward status lifecycle
//!   (`discovered -> posted -> awaiting_close -> finalized`)
//! - Append-only rationale comments, deduplicated by platform message id
//! - The single-row discovery watermark (monotone, never regresses)
//!
//! State lives here and only here; the controller reloads whatever it needs
//! at the start of each pass instead of caching authoritative copies.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod errors;
pub mod records;
pub mod store;

pub use errors::{Result, StoreError};
pub use records::{ProposalRecord, ProposalStatus, RationaleRecord, StatusCounts};
pub use store::Store;
