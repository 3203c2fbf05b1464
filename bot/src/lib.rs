//! Governance watcher: polls the chain feed for new governance actions,
//! announces each in a thread with a native poll, and after the voting
//! window closes posts a tallied result with a digest of community
//! rationales.
//!
//! The binary wires the concrete adapters together; everything in this
//! crate is written against the `ProposalSource`, `Summarizer`, and
//! `ChatPlatform` traits so the lifecycle logic can be driven by fakes.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod config;
pub mod controller;
pub mod format;
pub mod listener;
pub mod poll;

pub use config::BotConfig;
pub use controller::{Controller, ControllerConfig};
pub use listener::RationaleListener;
