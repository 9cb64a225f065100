//! Error taxonomy for fetching, voting and proposal creation

use crate::proposal::{DecodeError, VoteDirection};

/// Failure of a single indexer query.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IndexerError {
    /// The endpoint could not be reached or answered with a non-success status.
    #[error("indexer transport error: {0}")]
    Transport(String),

    /// The indexer answered but reported GraphQL errors.
    #[error("indexer query error: {0}")]
    Query(String),

    #[error("indexer returned an invalid record: {0}")]
    Decode(#[from] DecodeError),

    #[error("indexer returned malformed JSON: {0}")]
    Malformed(String),
}

impl IndexerError {
    pub fn is_transport(&self) -> bool {
        matches!(self, IndexerError::Transport(_))
    }
}

impl From<reqwest::Error> for IndexerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            IndexerError::Malformed(e.to_string())
        } else {
            IndexerError::Transport(e.to_string())
        }
    }
}

/// Failure of a whole fetch cycle.
///
/// Individual id-query failures never surface here; they are logged and
/// dropped from the merged result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("proposal indexer unavailable: {reason}")]
    TransportUnavailable { reason: String },
}

/// Failure reported by the transaction or confirmation collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    /// The wallet or node refused the transaction before it was mined.
    #[error("{0}")]
    Rejected(String),

    /// The transaction was mined but did not succeed, or confirmation failed.
    #[error("{0}")]
    Failed(String),
}

/// Outcome of a refused or failed vote.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoteError {
    #[error("wallet not connected")]
    NotConnected,

    #[error("already voted {0} on this proposal")]
    AlreadyVoted(VoteDirection),

    /// A submission for the same proposal is still in flight.
    #[error("vote already pending")]
    AlreadyPending,

    #[error("voting is closed for proposal {0}")]
    VotingClosed(u64),

    #[error("transaction rejected: {0}")]
    TransactionRejected(String),

    #[error("transaction failed: {0}")]
    TransactionFailed(String),
}

impl VoteError {
    pub(crate) fn from_transaction(err: TransactionError) -> Self {
        match err {
            TransactionError::Rejected(raw) => VoteError::TransactionRejected(friendly_reason(&raw)),
            TransactionError::Failed(raw) => VoteError::TransactionFailed(friendly_reason(&raw)),
        }
    }
}

/// Outcome of a refused or failed proposal creation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComposeError {
    #[error("wallet not connected")]
    NotConnected,

    #[error("proposal submission already pending")]
    AlreadyPending,

    #[error("invalid proposal: {0}")]
    Invalid(String),

    #[error("transaction rejected: {0}")]
    TransactionRejected(String),

    #[error("transaction failed: {0}")]
    TransactionFailed(String),
}

impl ComposeError {
    pub(crate) fn from_transaction(err: TransactionError) -> Self {
        match err {
            TransactionError::Rejected(raw) => {
                ComposeError::TransactionRejected(friendly_reason(&raw))
            }
            TransactionError::Failed(raw) => ComposeError::TransactionFailed(friendly_reason(&raw)),
        }
    }
}

/// Known contract revert names and the message shown to users for each.
const REVERT_REASONS: &[(&str, &str)] = &[
    ("StartTimeInPast", "Start time must be in the future"),
    ("InvalidVotingPeriod", "Invalid voting period duration"),
    ("VotingNotStarted", "Voting has not started yet"),
    ("VotingEnded", "Voting period has ended"),
    ("AlreadyVoted", "This wallet already voted on the proposal"),
];

/// Map a raw transaction error message to a user-facing reason.
///
/// Messages containing a known revert name are replaced; anything else is
/// passed through unchanged.
pub fn friendly_reason(raw: &str) -> String {
    REVERT_REASONS
        .iter()
        .find(|(needle, _)| raw.contains(needle))
        .map(|(_, friendly)| friendly.to_string())
        .unwrap_or_else(|| raw.to_string())
}
