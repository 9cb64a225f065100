//! Proposal creation and execution

use crate::collaborators::{
    ChainCollaborators, CreateProposalParams, Notification, ProposalRefresh, ReceiptStatus,
    TxHash,
};
use crate::countdown::now_unix;
use crate::error::ComposeError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Call data executed when a proposal passes
pub const DEFAULT_EXECUTION_DATA: &[u8] = &[0x4d, 0x53, 0x64, 0x6d];

/// Contract the execution data is sent to
pub const DEFAULT_EXECUTION_TARGET: &str = "0x40d5250D1ce81fdD1F0E0FB4F471E57AA0c1FaD3";

const SECONDS_PER_DAY: u64 = 86_400;

/// Fixed fields attached to every new proposal.
#[derive(Clone, Debug)]
pub struct ComposerConfig {
    pub execution_data: Vec<u8>,
    pub target: String,
    pub hook_data: Vec<u8>,
    /// Longest accepted voting period, in days
    pub max_voting_days: u64,
    /// Confirmations awaited before the proposal counts as created
    pub confirmations: u64,
    /// Upper bound on the confirmation wait. `None` waits forever.
    pub confirmation_timeout: Option<Duration>,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            execution_data: DEFAULT_EXECUTION_DATA.to_vec(),
            target: DEFAULT_EXECUTION_TARGET.to_string(),
            hook_data: Vec::new(),
            max_voting_days: 30,
            confirmations: 1,
            confirmation_timeout: Some(Duration::from_secs(300)),
        }
    }
}

/// User input for a new proposal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProposalDraft {
    pub uri: String,
    /// Unix seconds
    pub start_time: u64,
    pub voting_period_days: u64,
}

impl ProposalDraft {
    /// Check the draft against `now` and turn it into contract arguments.
    pub fn validate(
        &self,
        now: u64,
        config: &ComposerConfig,
    ) -> Result<CreateProposalParams, ComposeError> {
        let uri = self.uri.trim();
        if uri.is_empty() {
            return Err(ComposeError::Invalid("Proposal URI is required".into()));
        }
        if self.start_time <= now {
            return Err(ComposeError::Invalid(
                "Start time must be in the future".into(),
            ));
        }
        if self.voting_period_days == 0 || self.voting_period_days > config.max_voting_days {
            return Err(ComposeError::Invalid(format!(
                "Voting period must be between 1 and {} days",
                config.max_voting_days
            )));
        }

        Ok(CreateProposalParams {
            start_time: self.start_time,
            voting_period: self.voting_period_days * SECONDS_PER_DAY,
            uri: uri.to_string(),
            execution_data: config.execution_data.clone(),
            target: config.target.clone(),
            hook_data: config.hook_data.clone(),
        })
    }
}

/// Submits new proposals, one at a time.
pub struct ProposalComposer {
    chain: ChainCollaborators,
    refresher: Arc<dyn ProposalRefresh>,
    config: ComposerConfig,
    in_flight: AtomicBool,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ProposalComposer {
    pub fn new(
        chain: ChainCollaborators,
        refresher: Arc<dyn ProposalRefresh>,
        config: ComposerConfig,
    ) -> Self {
        Self {
            chain,
            refresher,
            config,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Validate `draft`, submit it and wait for the receipt.
    pub async fn create_proposal(&self, draft: ProposalDraft) -> Result<TxHash, ComposeError> {
        let result = self.run_create(&draft).await;
        match &result {
            Ok(tx) => {
                info!(uri = %draft.uri, tx = %tx, "Proposal created");
                self.chain.notifier.notify(Notification::info(
                    "Success",
                    "Proposal created successfully",
                ));
            }
            Err(ComposeError::AlreadyPending) => {
                debug!("Ignoring proposal submission while another is pending");
            }
            Err(ComposeError::NotConnected) => {
                self.chain.notifier.notify(Notification::destructive(
                    "Wallet Not Connected",
                    "Please connect your wallet to create a proposal",
                ));
            }
            Err(e) => {
                warn!(uri = %draft.uri, error = %e, "Proposal not created");
                let reason = match e {
                    ComposeError::Invalid(reason)
                    | ComposeError::TransactionRejected(reason)
                    | ComposeError::TransactionFailed(reason) => reason.clone(),
                    other => other.to_string(),
                };
                self.chain
                    .notifier
                    .notify(Notification::destructive("Error creating proposal", reason));
            }
        }
        result
    }

    async fn run_create(&self, draft: &ProposalDraft) -> Result<TxHash, ComposeError> {
        if !self.chain.session.is_connected().await {
            return Err(ComposeError::NotConnected);
        }

        let params = draft.validate(now_unix(), &self.config)?;

        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(ComposeError::AlreadyPending);
        }
        let _guard = InFlight(&self.in_flight);

        let tx = self
            .chain
            .contract
            .create_proposal(params)
            .await
            .map_err(ComposeError::from_transaction)?;
        debug!(tx = %tx, "Proposal transaction sent, awaiting confirmation");

        match self.await_confirmation(&tx).await? {
            ReceiptStatus::Success => {}
            ReceiptStatus::Reverted => {
                return Err(ComposeError::TransactionFailed("Transaction failed".to_string()))
            }
        }

        self.refresher.refresh_now().await;
        Ok(tx)
    }

    async fn await_confirmation(&self, tx: &TxHash) -> Result<ReceiptStatus, ComposeError> {
        let wait = self
            .chain
            .watcher
            .wait_for_receipt(tx, self.config.confirmations);

        let outcome = match self.config.confirmation_timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                ComposeError::TransactionFailed(format!(
                    "confirmation timed out after {}s",
                    limit.as_secs()
                ))
            })?,
            None => wait.await,
        };

        outcome.map_err(ComposeError::from_transaction)
    }

    /// Execute a proposal that has passed. No client-side checks apply; the
    /// contract decides whether execution is allowed.
    pub async fn execute_proposal(&self, proposal_id: u64) -> Result<TxHash, ComposeError> {
        if !self.chain.session.is_connected().await {
            return Err(ComposeError::NotConnected);
        }

        let tx = self
            .chain
            .contract
            .execute_proposal(proposal_id)
            .await
            .map_err(ComposeError::from_transaction)?;
        info!(proposal_id, tx = %tx, "Execution submitted");
        self.refresher.refresh_now().await;
        Ok(tx)
    }
}
