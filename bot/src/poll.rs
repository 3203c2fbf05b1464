//! Vote semantics
//!
//! The poll shape every proposal gets, and the tally rules applied when it
//! closes: a poll nobody voted in reads as Abstain, and a tie resolves in
//! option order (Yes before No before Abstain).

use agora_chat::{OptionCount, PollOption, PollRequest};

pub const VOTE_YES: &str = "Yes";
pub const VOTE_NO: &str = "No";
pub const VOTE_ABSTAIN: &str = "Abstain";

pub const POLL_QUESTION: &str = "How should we vote on this proposal?";

/// The fixed single-select answer set attached to every proposal.
pub fn poll_options() -> Vec<PollOption> {
    vec![
        PollOption::new(VOTE_YES, "✅"),
        PollOption::new(VOTE_NO, "❌"),
        PollOption::new(VOTE_ABSTAIN, "🤷"),
    ]
}

/// The full poll request for one proposal.
pub fn poll_request(duration_minutes: u32) -> PollRequest {
    PollRequest {
        question: POLL_QUESTION.to_string(),
        options: poll_options(),
        duration_minutes,
    }
}

/// Vote counts bucketed by option.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VoteTally {
    pub yes: u64,
    pub no: u64,
    pub abstain: u64,
}

impl VoteTally {
    /// Bucket platform counts by option text; unknown options are ignored.
    pub fn from_counts(counts: &[OptionCount]) -> Self {
        let mut tally = Self::default();
        for count in counts {
            match count.text.as_str() {
                VOTE_YES => tally.yes += count.votes,
                VOTE_NO => tally.no += count.votes,
                VOTE_ABSTAIN => tally.abstain += count.votes,
                other => {
                    tracing::debug!(option = other, "Ignoring unknown poll option");
                }
            }
        }
        tally
    }

    pub fn total(&self) -> u64 {
        self.yes + self.no + self.abstain
    }

    /// The winning option name.
    pub fn outcome(&self) -> &'static str {
        if self.total() == 0 {
            return VOTE_ABSTAIN;
        }
        let max = self.yes.max(self.no).max(self.abstain);
        if self.yes == max {
            VOTE_YES
        } else if self.no == max {
            VOTE_NO
        } else {
            VOTE_ABSTAIN
        }
    }

    /// Votes cast for the winning option.
    pub fn outcome_votes(&self) -> u64 {
        match self.outcome() {
            VOTE_YES => self.yes,
            VOTE_NO => self.no,
            _ => self.abstain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(yes: u64, no: u64, abstain: u64) -> Vec<OptionCount> {
        vec![
            OptionCount {
                text: VOTE_YES.to_string(),
                votes: yes,
            },
            OptionCount {
                text: VOTE_NO.to_string(),
                votes: no,
            },
            OptionCount {
                text: VOTE_ABSTAIN.to_string(),
                votes: abstain,
            },
        ]
    }

    #[test]
    fn test_clear_winners() {
        assert_eq!(VoteTally::from_counts(&counts(5, 2, 1)).outcome(), "Yes");
        assert_eq!(VoteTally::from_counts(&counts(1, 4, 2)).outcome(), "No");
        assert_eq!(
            VoteTally::from_counts(&counts(1, 2, 7)).outcome(),
            "Abstain"
        );
    }

    #[test]
    fn test_zero_votes_reads_as_abstain() {
        let tally = VoteTally::from_counts(&counts(0, 0, 0));
        assert_eq!(tally.total(), 0);
        assert_eq!(tally.outcome(), "Abstain");
        assert_eq!(tally.outcome_votes(), 0);
    }

    #[test]
    fn test_ties_resolve_in_option_order() {
        assert_eq!(VoteTally::from_counts(&counts(3, 3, 1)).outcome(), "Yes");
        assert_eq!(VoteTally::from_counts(&counts(3, 1, 3)).outcome(), "Yes");
        assert_eq!(VoteTally::from_counts(&counts(1, 3, 3)).outcome(), "No");
        assert_eq!(VoteTally::from_counts(&counts(2, 2, 2)).outcome(), "Yes");
    }

    #[test]
    fn test_unknown_options_ignored() {
        let mut raw = counts(1, 0, 0);
        raw.push(OptionCount {
            text: "Maybe".to_string(),
            votes: 99,
        });
        let tally = VoteTally::from_counts(&raw);
        assert_eq!(tally.total(), 1);
        assert_eq!(tally.outcome(), "Yes");
    }

    #[test]
    fn test_outcome_votes_follow_winner() {
        let tally = VoteTally::from_counts(&counts(2, 6, 1));
        assert_eq!(tally.outcome_votes(), 6);
    }

    #[test]
    fn test_poll_request_shape() {
        let poll = poll_request(20_160);
        assert_eq!(poll.question, POLL_QUESTION);
        assert_eq!(poll.options.len(), 3);
        assert_eq!(poll.options[0].text, "Yes");
        assert_eq!(poll.options[0].emoji.as_deref(), Some("✅"));
        assert_eq!(poll.duration_minutes, 20_160);
    }
}
