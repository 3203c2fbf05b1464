//! Prompt builders for the two digest shapes the bot needs
//!
//! Kept next to the client so the wording and the output-size expectations
//! (under 1000 chars for proposal digests, under 500 for rationale
//! roll-ups) live in one place.

use serde_json::Value;

/// At most this many rationale entries are quoted in a prompt
pub const MAX_PROMPT_RATIONALES: usize = 20;

/// Digest prompt for a newly discovered proposal.
///
/// `metadata` should be the reduced payload (type, title, deposit, epochs,
/// metadata document), not the raw feed row, to keep the prompt small.
pub fn proposal_prompt(metadata: &Value) -> String {
    let rendered =
        serde_json::to_string_pretty(metadata).unwrap_or_else(|_| metadata.to_string());
    format!(
        "You are an expert Cardano governance analyst. Given JSON metadata of an \
         on-chain governance proposal, produce:\n\
         1. A concise 2-3 sentence summary suitable for Discord.\n\
         2. 3-5 bullet points with key insights (impact, pros/cons, important details).\n\
         3. Format using Discord markdown (** for bold, * for italics, - for bullets).\n\
         4. Keep the total response under 1000 characters.\n\
         5. Do not include technical information like expiration date, proposed epoch, or deposit.\n\n\
         Proposal metadata:\n```json\n{rendered}\n```"
    )
}

/// Roll-up prompt for community rationales after a poll closes.
///
/// `entries` are (author, text) pairs in submission order; only the first
/// twenty are quoted. A zero-vote poll gets the neutral wording, any other
/// tally gets the outcome-anchored wording.
pub fn rationale_prompt(
    outcome: &str,
    outcome_votes: u64,
    total_votes: u64,
    entries: &[(String, String)],
) -> String {
    let quoted: Vec<String> = entries
        .iter()
        .take(MAX_PROMPT_RATIONALES)
        .map(|(author, text)| format!("- {author}: {text}"))
        .collect();
    let quoted = quoted.join("\n");

    if total_votes == 0 {
        format!(
            "No votes were cast in the poll. Treat this as an \"Abstain\" outcome. \
             Using the following rationales from community members, generate a concise \
             summary (2-3 sentences) that neutrally captures the main themes raised:\n\n\
             Community Rationales:\n{quoted}\n\n\
             Keep it balanced and under 500 characters."
        )
    } else {
        format!(
            "Based on the community vote ({outcome} won with {outcome_votes} votes) and \
             the following rationales from community members, generate a concise summary \
             (2-3 sentences) that captures the main reasons for this decision:\n\n\
             Community Rationales:\n{quoted}\n\n\
             Provide a balanced summary that reflects the community's reasoning. \
             Keep it under 500 characters."
        )
    }
}
