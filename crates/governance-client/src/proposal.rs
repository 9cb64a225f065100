//! Proposal records as served by the governance indexer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One governance proposal snapshot.
///
/// Tallies and the `executed` flag are owned by the contract; the client only
/// ever sees them through the indexer and replaces the whole record on refetch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Proposal {
    pub id: u64,
    pub proposer_id: String,
    pub uri: String,
    /// Unix seconds
    pub start_time: u64,
    /// Unix seconds
    pub end_time: u64,
    pub for_score: u128,
    pub against_score: u128,
    pub executed: bool,
}

impl Proposal {
    /// Whether `now` falls inside `[start_time, end_time)`.
    pub fn is_open_at(&self, now: u64) -> bool {
        now >= self.start_time && now < self.end_time
    }

    /// Whether the voting window has closed or the proposal was executed.
    pub fn is_closed_at(&self, now: u64) -> bool {
        self.executed || now >= self.end_time
    }

    /// Two-letter badge used by front-ends for the proposer avatar.
    pub fn proposer_badge(&self) -> String {
        self.proposer_id
            .chars()
            .take(2)
            .collect::<String>()
            .to_uppercase()
    }
}

/// Wire shape of a proposal: every numeric field is a decimal string.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProposal {
    pub id: String,
    pub proposer_id: String,
    pub uri: String,
    pub start_time: String,
    pub end_time: String,
    pub for_score: String,
    pub against_score: String,
    pub executed: bool,
}

/// Rejection reasons when turning a [`RawProposal`] into a [`Proposal`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("field `{field}` is not an unsigned integer: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("proposal {id} ends ({end_time}) before it starts ({start_time})")]
    InvertedWindow {
        id: u64,
        start_time: u64,
        end_time: u64,
    },
}

pub(crate) fn parse_decimal<T: FromStr>(field: &'static str, value: &str) -> Result<T, DecodeError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| DecodeError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

impl TryFrom<RawProposal> for Proposal {
    type Error = DecodeError;

    fn try_from(raw: RawProposal) -> Result<Self, Self::Error> {
        let proposal = Proposal {
            id: parse_decimal("id", &raw.id)?,
            start_time: parse_decimal("startTime", &raw.start_time)?,
            end_time: parse_decimal("endTime", &raw.end_time)?,
            for_score: parse_decimal("forScore", &raw.for_score)?,
            against_score: parse_decimal("againstScore", &raw.against_score)?,
            proposer_id: raw.proposer_id,
            uri: raw.uri,
            executed: raw.executed,
        };

        if proposal.end_time < proposal.start_time {
            return Err(DecodeError::InvertedWindow {
                id: proposal.id,
                start_time: proposal.start_time,
                end_time: proposal.end_time,
            });
        }

        Ok(proposal)
    }
}

/// Direction of a vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    For,
    Against,
}

impl VoteDirection {
    /// Signed unit weight sent to the contract: `+1` for, `-1` against.
    pub fn weight(self) -> i128 {
        match self {
            VoteDirection::For => 1,
            VoteDirection::Against => -1,
        }
    }
}

impl fmt::Display for VoteDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteDirection::For => f.write_str("for"),
            VoteDirection::Against => f.write_str("against"),
        }
    }
}

impl FromStr for VoteDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "for" | "yes" | "+" => Ok(VoteDirection::For),
            "against" | "no" | "-" => Ok(VoteDirection::Against),
            other => Err(format!("unknown vote direction: {other}")),
        }
    }
}

/// A vote cast event from the indexer feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VoteCast {
    pub proposal_id: u64,
    pub voter_id: String,
    pub weight: i128,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVoteCast {
    pub proposal_id: String,
    pub voter_id: String,
    pub weight: String,
}

impl TryFrom<RawVoteCast> for VoteCast {
    type Error = DecodeError;

    fn try_from(raw: RawVoteCast) -> Result<Self, Self::Error> {
        Ok(VoteCast {
            proposal_id: parse_decimal("proposalId", &raw.proposal_id)?,
            weight: parse_decimal("weight", &raw.weight)?,
            voter_id: raw.voter_id,
        })
    }
}

/// Execution marker from the executed-proposals feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExecutedProposal {
    pub id: u64,
    pub executed: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RawExecutedProposal {
    pub id: String,
    pub executed: bool,
}

impl TryFrom<RawExecutedProposal> for ExecutedProposal {
    type Error = DecodeError;

    fn try_from(raw: RawExecutedProposal) -> Result<Self, Self::Error> {
        Ok(ExecutedProposal {
            id: parse_decimal("id", &raw.id)?,
            executed: raw.executed,
        })
    }
}

#[cfg(test)]
pub(crate) fn sample_proposal(id: u64, uri: &str) -> Proposal {
    Proposal {
        id,
        proposer_id: "0xabc0000000000000000000000000000000000001".into(),
        uri: uri.into(),
        start_time: 1_700_000_000,
        end_time: 4_000_000_000,
        for_score: 0,
        against_score: 0,
        executed: false,
    }
}
