//! Message rendering
//!
//! Everything the bot says in chat is built here: the proposal announcement,
//! the results digest, thread titles, explorer links, and the ADA amounts
//! embedded in them. Limits are character-based to match how the platform
//! counts message length.

use crate::poll::VoteTally;
use agora_feed::{FeedProposal, GovActionId};
use serde_json::{Value, json};

/// Platform message length ceiling
pub const MESSAGE_MAX_CHARS: usize = 2000;

/// Rationale digests are clamped well below the message ceiling
pub const SUMMARY_MAX_CHARS: usize = 500;

/// Title portion of a thread name
const THREAD_TITLE_MAX_CHARS: usize = 90;

/// Gaid prefix shown in a thread name
const THREAD_GAID_PREFIX_CHARS: usize = 10;

/// Clamp to a character limit, ellipsized when something was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Thread name: clipped title plus enough of the gaid to disambiguate.
pub fn thread_title(title: &str, gaid: &GovActionId) -> String {
    let short_title: String = title.chars().take(THREAD_TITLE_MAX_CHARS).collect();
    let gaid_str = gaid.to_string();
    let short_gaid: String = gaid_str.chars().take(THREAD_GAID_PREFIX_CHARS).collect();
    format!("{short_title} ({short_gaid}...)")
}

/// Render a lovelace amount as whole ADA with thousands separators.
///
/// Missing or null values and the indexer's literal `"string"` placeholder
/// render as `?`; values that aren't numeric at all are passed through
/// untouched rather than hidden.
pub fn format_ada(lovelace: Option<&Value>) -> String {
    let Some(value) = lovelace else {
        return "?".to_string();
    };
    if value.is_null() {
        return "?".to_string();
    }

    let amount = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.eq_ignore_ascii_case("string") => return "?".to_string(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    };
    match amount {
        Some(lovelace) => {
            let ada = (lovelace / 1_000_000.0).round() as i64;
            format!("{} ₳", thousands(ada))
        }
        None => match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    }
}

/// GovTool deep link; the preview network has its own host.
pub fn govtool_link(koios_base_url: &str, gaid: &GovActionId) -> String {
    let host = if koios_base_url.contains("preview") {
        "https://preview.gov.tools"
    } else {
        "https://gov.tools"
    };
    format!("{host}/outcomes/governance_actions/{gaid}")
}

/// AdaStat explorer link.
pub fn adastat_link(gaid: &GovActionId) -> String {
    format!("https://adastat.net/governances/{}", gaid.adastat_id())
}

/// The reduced metadata payload handed to the summarizer.
///
/// Keeps the prompt focused on what matters for a digest instead of the
/// whole indexer row.
pub fn reduced_metadata(proposal: &FeedProposal) -> Value {
    json!({
        "proposal_type": proposal.proposal_type,
        "title": proposal.title(),
        "deposit": proposal.raw.get("deposit"),
        "proposed_epoch": proposal.raw.get("proposed_epoch"),
        "expiration": proposal.raw.get("expiration"),
        "meta_json": proposal.meta_json(),
    })
}

/// The announcement message posted at the top of each proposal thread.
pub fn announcement(proposal: &FeedProposal, summary: &str, koios_base_url: &str) -> String {
    let title = proposal.title();
    let action_type = proposal.proposal_type.as_deref().unwrap_or("?");
    let deposit = format_ada(proposal.raw.get("deposit"));
    let expiration = field_or_question(proposal.raw.get("expiration"));
    let adastat = adastat_link(&proposal.gaid);
    let govtool = govtool_link(koios_base_url, &proposal.gaid);

    let text = format!(
        "# {title}\n\n\
         **GAID:** `{}`\n\
         **Action Type:** {action_type}\n\
         **Deposit:** {deposit}\n\
         **Expiration:** {expiration}\n\n\
         {summary}\n\n\
         **Links:** [AdaStat]({adastat}) | [GovTool]({govtool})\n\n\
         *Please vote below and add your rationale as a comment starting with \"RATIONAL:\"*",
        proposal.gaid
    );
    truncate_chars(&text, MESSAGE_MAX_CHARS)
}

/// The results message posted when a poll closes.
pub fn results_message(tally: &VoteTally, rationale_summary: &str) -> String {
    let text = format!(
        "## 📊 **Poll Results**\n\n\
         **Final Vote:** {}\n\
         - ✅ Yes: {} votes\n\
         - ❌ No: {} votes\n\
         - 🤷 Abstain: {} votes\n\n\
         **Total Votes:** {}\n\n\
         ## 📝 **Community Rationale**\n\n\
         {rationale_summary}",
        tally.outcome(),
        tally.yes,
        tally.no,
        tally.abstain,
        tally.total()
    );
    truncate_chars(&text, MESSAGE_MAX_CHARS)
}

fn field_or_question(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(v) if !v.is_null() => v.to_string(),
        _ => "?".to_string(),
    }
}

fn thousands(n: i64) -> String {
    let digits = n.abs().to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if n < 0 { format!("-{grouped}") } else { grouped }
}
