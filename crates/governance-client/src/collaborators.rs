//! Seams to the wallet, the chain and the presentation layer
//!
//! The coordinators in this crate only talk to the outside world through
//! these traits: a concrete JSON-RPC implementation lives in `chain-rpc`, and
//! tests plug in in-memory fakes.

use crate::error::TransactionError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Transaction hash returned by a contract write.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Final status of a mined transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// Arguments of the contract's `castVote`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CastVoteParams {
    pub proposal_id: u64,
    /// `+1` for, `-1` against
    pub weight: i128,
    pub hook_data: Vec<u8>,
}

/// Arguments of the contract's `createProposal`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateProposalParams {
    /// Unix seconds
    pub start_time: u64,
    /// Seconds
    pub voting_period: u64,
    pub uri: String,
    pub execution_data: Vec<u8>,
    /// Hex address of the call target
    pub target: String,
    pub hook_data: Vec<u8>,
}

/// Contract writes. Each call returns once the transaction is submitted.
#[async_trait]
pub trait GovernanceContract: Send + Sync {
    async fn create_proposal(&self, params: CreateProposalParams)
        -> Result<TxHash, TransactionError>;

    async fn cast_vote(&self, params: CastVoteParams) -> Result<TxHash, TransactionError>;

    async fn execute_proposal(&self, proposal_id: u64) -> Result<TxHash, TransactionError>;
}

/// Waits for a submitted transaction to be mined.
#[async_trait]
pub trait ConfirmationWatcher: Send + Sync {
    async fn wait_for_receipt(
        &self,
        tx: &TxHash,
        confirmations: u64,
    ) -> Result<ReceiptStatus, TransactionError>;
}

/// Whether a signing identity is currently available.
#[async_trait]
pub trait Session: Send + Sync {
    async fn is_connected(&self) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Destructive,
}

/// A user-visible toast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity: Severity::Info,
        }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity: Severity::Destructive,
        }
    }
}

/// Sink for user-visible notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// On-demand refresh hook, triggered after a successful write.
#[async_trait]
pub trait ProposalRefresh: Send + Sync {
    async fn refresh_now(&self);
}

/// The chain-facing collaborators shared by the vote coordinator and the
/// proposal composer.
#[derive(Clone)]
pub struct ChainCollaborators {
    pub contract: Arc<dyn GovernanceContract>,
    pub watcher: Arc<dyn ConfirmationWatcher>,
    pub session: Arc<dyn Session>,
    pub notifier: Arc<dyn Notifier>,
}

/// Parse `0x`-prefixed (or bare) hex into bytes. `"0x"` is the empty payload.
pub fn parse_hex_bytes(value: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let trimmed = value.trim();
    hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
}
