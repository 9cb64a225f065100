//! Per-proposal vote coordination
//!
//! Every proposal key moves through
//! `Unvoted -> Submitting -> Voted(direction) | Unvoted`. `Voted` is terminal
//! for the lifetime of the coordinator. The map is a client-side guard
//! against double clicks and repeat votes in one session; the contract stays
//! the source of truth for tallies.

use crate::collaborators::{
    CastVoteParams, ChainCollaborators, Notification, ProposalRefresh, ReceiptStatus, TxHash,
};
use crate::config::VoteConfig;
use crate::countdown::now_unix;
use crate::error::VoteError;
use crate::fetcher::ProposalStore;
use crate::proposal::VoteDirection;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Client-side vote state of one proposal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteState {
    Unvoted,
    Submitting,
    Voted(VoteDirection),
}

pub struct VoteCoordinator {
    chain: ChainCollaborators,
    refresher: Arc<dyn ProposalRefresh>,
    store: Arc<ProposalStore>,
    states: Mutex<HashMap<u64, VoteState>>,
    config: VoteConfig,
}

/// Holds a proposal in `Submitting`; dropping it without [`commit`] rolls the
/// key back to `Unvoted`, whichever way the submission exited.
///
/// [`commit`]: SubmissionGuard::commit
struct SubmissionGuard<'a> {
    states: &'a Mutex<HashMap<u64, VoteState>>,
    proposal_id: u64,
}

impl SubmissionGuard<'_> {
    fn commit(self, direction: VoteDirection) {
        self.states
            .lock()
            .insert(self.proposal_id, VoteState::Voted(direction));
    }
}

impl Drop for SubmissionGuard<'_> {
    fn drop(&mut self) {
        let mut states = self.states.lock();
        if states.get(&self.proposal_id) == Some(&VoteState::Submitting) {
            states.remove(&self.proposal_id);
        }
    }
}

impl VoteCoordinator {
    pub fn new(
        chain: ChainCollaborators,
        refresher: Arc<dyn ProposalRefresh>,
        store: Arc<ProposalStore>,
        config: VoteConfig,
    ) -> Self {
        Self {
            chain,
            refresher,
            store,
            states: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn state(&self, proposal_id: u64) -> VoteState {
        self.states
            .lock()
            .get(&proposal_id)
            .copied()
            .unwrap_or(VoteState::Unvoted)
    }

    /// Direction recorded for this session, if any.
    pub fn status(&self, proposal_id: u64) -> Option<VoteDirection> {
        match self.state(proposal_id) {
            VoteState::Voted(direction) => Some(direction),
            _ => None,
        }
    }

    pub fn is_pending(&self, proposal_id: u64) -> bool {
        self.state(proposal_id) == VoteState::Submitting
    }

    /// Whether vote buttons for this proposal should be disabled.
    pub fn is_locked(&self, proposal_id: u64) -> bool {
        self.state(proposal_id) != VoteState::Unvoted
    }

    /// Cast a vote and wait for it to be confirmed.
    ///
    /// Every outcome except [`VoteError::AlreadyPending`] is also reported
    /// through the notifier.
    pub async fn submit_vote(
        &self,
        proposal_id: u64,
        direction: VoteDirection,
    ) -> Result<TxHash, VoteError> {
        let result = self.run_vote(proposal_id, direction).await;
        match &result {
            Ok(tx) => {
                info!(proposal_id, %direction, tx = %tx, "Vote recorded");
                self.chain.notifier.notify(Notification::info(
                    "Vote Submitted",
                    format!("Your {direction} vote has been recorded"),
                ));
            }
            Err(VoteError::AlreadyPending) => {
                debug!(proposal_id, "Ignoring vote while another is pending");
            }
            Err(e) => {
                warn!(proposal_id, %direction, error = %e, "Vote not recorded");
                self.chain.notifier.notify(failure_notification(e));
            }
        }
        result
    }

    async fn run_vote(
        &self,
        proposal_id: u64,
        direction: VoteDirection,
    ) -> Result<TxHash, VoteError> {
        if !self.chain.session.is_connected().await {
            return Err(VoteError::NotConnected);
        }

        let guard = self.begin(proposal_id)?;

        let params = CastVoteParams {
            proposal_id,
            weight: direction.weight(),
            hook_data: self.config.hook_data.clone(),
        };
        let tx = self
            .chain
            .contract
            .cast_vote(params)
            .await
            .map_err(VoteError::from_transaction)?;
        debug!(proposal_id, tx = %tx, "Vote transaction sent, awaiting confirmation");

        match self.await_confirmation(&tx).await? {
            ReceiptStatus::Success => {}
            ReceiptStatus::Reverted => {
                return Err(VoteError::TransactionFailed("Transaction failed".to_string()))
            }
        }

        guard.commit(direction);
        self.refresher.refresh_now().await;
        Ok(tx)
    }

    /// Check the per-key preconditions and move the key to `Submitting`.
    fn begin(&self, proposal_id: u64) -> Result<SubmissionGuard<'_>, VoteError> {
        let mut states = self.states.lock();
        match states.get(&proposal_id) {
            Some(VoteState::Voted(direction)) => return Err(VoteError::AlreadyVoted(*direction)),
            // A repeat click stays silent even if the window closed meanwhile.
            Some(VoteState::Submitting) => return Err(VoteError::AlreadyPending),
            _ => {}
        }

        if let Some(proposal) = self.store.get(proposal_id) {
            if proposal.is_closed_at(now_unix()) {
                return Err(VoteError::VotingClosed(proposal_id));
            }
        }

        states.insert(proposal_id, VoteState::Submitting);
        Ok(SubmissionGuard {
            states: &self.states,
            proposal_id,
        })
    }

    async fn await_confirmation(&self, tx: &TxHash) -> Result<ReceiptStatus, VoteError> {
        let wait = self
            .chain
            .watcher
            .wait_for_receipt(tx, self.config.confirmations);

        let outcome = match self.config.confirmation_timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                VoteError::TransactionFailed(format!(
                    "confirmation timed out after {}s",
                    limit.as_secs()
                ))
            })?,
            None => wait.await,
        };

        outcome.map_err(VoteError::from_transaction)
    }
}

fn failure_notification(error: &VoteError) -> Notification {
    match error {
        VoteError::NotConnected => Notification::destructive(
            "Wallet Not Connected",
            "Please connect your wallet to vote",
        ),
        VoteError::AlreadyVoted(direction) => Notification::destructive(
            "Already Voted",
            format!("You already voted {direction} for this proposal"),
        ),
        VoteError::VotingClosed(id) => Notification::destructive(
            "Voting Closed",
            format!("Voting has ended for proposal #{id}"),
        ),
        VoteError::TransactionRejected(reason) | VoteError::TransactionFailed(reason) => {
            Notification::destructive("Voting Error", reason.clone())
        }
        VoteError::AlreadyPending => {
            Notification::destructive("Voting Error", "A vote is already pending")
        }
    }
}
