//! Environment-sourced configuration
//!
//! Everything the bot needs comes from the process environment (a `.env`
//! file is loaded by the binary before this runs). Required values missing
//! at startup are fatal; optional values fall back to defaults. The one
//! deliberate exception is `INITIAL_BLOCK_TIME`, where an unparseable value
//! is logged and ignored so a typo cannot re-announce the whole backlog.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Voting window default: 14 days
const DEFAULT_POLL_DURATION_MINUTES: u32 = 20_160;

/// Voting window bounds in minutes (15 minutes up to 32 days)
const MIN_POLL_DURATION_MINUTES: u32 = 15;
const MAX_POLL_DURATION_MINUTES: u32 = 46_080;

/// Feed poll cadence default, in hours
const DEFAULT_POLL_INTERVAL_HOURS: u64 = 6;

const DEFAULT_KOIOS_BASE_URL: &str = "https://api.koios.rest/api/v1";
const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_DB_PATH: &str = "governance.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {name}")]
    Missing { name: &'static str },

    #[error("invalid value for {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

/// Fully validated runtime configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub discord_bot_token: String,
    pub discord_channel_id: u64,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub koios_base_url: String,
    pub koios_api_token: Option<String>,
    /// How often a discovery/closure cycle runs
    pub poll_interval: Duration,
    /// How long each proposal poll accepts votes
    pub poll_duration_minutes: u32,
    /// Watermark seed for a fresh database; `None` puts no lower bound on
    /// the first fetch
    pub initial_block_time: Option<i64>,
    pub db_path: PathBuf,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary lookup function (tests pass a map).
    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let discord_bot_token = required(lookup, "DISCORD_BOT_TOKEN")?;
        let discord_channel_id = required(lookup, "DISCORD_CHANNEL_ID")?
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::Invalid {
                name: "DISCORD_CHANNEL_ID",
                message: format!("expected a numeric channel id: {e}"),
            })?;
        let gemini_api_key = required(lookup, "GEMINI_API_KEY")?;
        let gemini_model =
            optional(lookup, "GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());

        let koios_base_url = optional(lookup, "KOIOS_BASE_URL")
            .unwrap_or_else(|| DEFAULT_KOIOS_BASE_URL.to_string());
        url::Url::parse(&koios_base_url).map_err(|e| ConfigError::Invalid {
            name: "KOIOS_BASE_URL",
            message: format!("not a valid URL: {e}"),
        })?;
        let koios_api_token = optional(lookup, "KOIOS_API_TOKEN");

        let poll_interval_hours = match optional(lookup, "POLL_INTERVAL_HOURS") {
            Some(raw) => raw.trim().parse::<u64>().ok().filter(|h| *h >= 1).ok_or(
                ConfigError::Invalid {
                    name: "POLL_INTERVAL_HOURS",
                    message: format!("expected an integer >= 1, got {raw:?}"),
                },
            )?,
            None => DEFAULT_POLL_INTERVAL_HOURS,
        };

        let poll_duration_minutes = match optional(lookup, "POLL_DURATION_MINUTES") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|m| {
                    (MIN_POLL_DURATION_MINUTES..=MAX_POLL_DURATION_MINUTES).contains(m)
                })
                .ok_or(ConfigError::Invalid {
                    name: "POLL_DURATION_MINUTES",
                    message: format!(
                        "expected an integer in {MIN_POLL_DURATION_MINUTES}..={MAX_POLL_DURATION_MINUTES}, got {raw:?}"
                    ),
                })?,
            None => DEFAULT_POLL_DURATION_MINUTES,
        };

        // Unparseable seed is ignored, not fatal: the bot still starts, the
        // first fetch just has no lower bound
        let initial_block_time = optional(lookup, "INITIAL_BLOCK_TIME").and_then(|raw| {
            match raw.trim().parse::<i64>() {
                Ok(ts) => Some(ts),
                Err(_) => {
                    tracing::warn!(value = %raw, "Ignoring invalid INITIAL_BLOCK_TIME");
                    None
                }
            }
        });

        let db_path = PathBuf::from(
            optional(lookup, "AGORA_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
        );

        Ok(Self {
            discord_bot_token,
            discord_channel_id,
            gemini_api_key,
            gemini_model,
            koios_base_url,
            koios_api_token,
            poll_interval: Duration::from_secs(poll_interval_hours * 3600),
            poll_duration_minutes,
            initial_block_time,
            db_path,
        })
    }
}

fn required(
    lookup: &dyn Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing { name }),
    }
}

fn optional(lookup: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|value| !value.trim().is_empty())
}
