//! In-memory doubles for the chain-facing collaborators

use crate::collaborators::{
    CastVoteParams, ChainCollaborators, ConfirmationWatcher, CreateProposalParams,
    GovernanceContract, Notification, Notifier, ProposalRefresh, ReceiptStatus, Session, TxHash,
};
use crate::error::TransactionError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Default)]
pub struct FakeContract {
    pub votes: Mutex<Vec<CastVoteParams>>,
    pub created: Mutex<Vec<CreateProposalParams>>,
    pub executed: Mutex<Vec<u64>>,
    /// When set, every write is rejected with this message.
    pub reject_with: Mutex<Option<String>>,
    /// When set, `cast_vote` and `create_proposal` each take a permit first.
    pub gate: Option<Arc<Semaphore>>,
}

impl FakeContract {
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    fn check_rejection(&self) -> Result<(), TransactionError> {
        match self.reject_with.lock().clone() {
            Some(message) => Err(TransactionError::Rejected(message)),
            None => Ok(()),
        }
    }

    async fn wait_gate(&self) {
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }
}

#[async_trait]
impl GovernanceContract for FakeContract {
    async fn create_proposal(
        &self,
        params: CreateProposalParams,
    ) -> Result<TxHash, TransactionError> {
        self.wait_gate().await;
        self.check_rejection()?;
        let mut created = self.created.lock();
        created.push(params);
        Ok(TxHash(format!("0xc{}", created.len())))
    }

    async fn cast_vote(&self, params: CastVoteParams) -> Result<TxHash, TransactionError> {
        self.wait_gate().await;
        self.check_rejection()?;
        let tx = TxHash(format!("0xv{}", params.proposal_id));
        self.votes.lock().push(params);
        Ok(tx)
    }

    async fn execute_proposal(&self, proposal_id: u64) -> Result<TxHash, TransactionError> {
        self.check_rejection()?;
        self.executed.lock().push(proposal_id);
        Ok(TxHash(format!("0xe{proposal_id}")))
    }
}

pub struct FakeWatcher {
    pub outcome: Mutex<Result<ReceiptStatus, TransactionError>>,
    pub waited: Mutex<Vec<(TxHash, u64)>>,
    /// Never resolve, to exercise the confirmation timeout.
    pub hang: AtomicBool,
}

impl FakeWatcher {
    pub fn returning(outcome: Result<ReceiptStatus, TransactionError>) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            waited: Mutex::new(Vec::new()),
            hang: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ConfirmationWatcher for FakeWatcher {
    async fn wait_for_receipt(
        &self,
        tx: &TxHash,
        confirmations: u64,
    ) -> Result<ReceiptStatus, TransactionError> {
        self.waited.lock().push((tx.clone(), confirmations));
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.outcome.lock().clone()
    }
}

pub struct FakeSession(pub AtomicBool);

#[async_trait]
impl Session for FakeSession {
    async fn is_connected(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn titles(&self) -> Vec<String> {
        self.seen.lock().iter().map(|n| n.title.clone()).collect()
    }

    pub fn last(&self) -> Option<Notification> {
        self.seen.lock().last().cloned()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().push(notification);
    }
}

#[derive(Default)]
pub struct CountingRefresh {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ProposalRefresh for CountingRefresh {
    async fn refresh_now(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Handles to every double wired into a [`ChainCollaborators`].
pub struct Harness {
    pub contract: Arc<FakeContract>,
    pub watcher: Arc<FakeWatcher>,
    pub session: Arc<FakeSession>,
    pub notifier: Arc<RecordingNotifier>,
    pub refresh: Arc<CountingRefresh>,
}

impl Harness {
    pub fn new(contract: FakeContract) -> Self {
        Self {
            contract: Arc::new(contract),
            watcher: Arc::new(FakeWatcher::returning(Ok(ReceiptStatus::Success))),
            session: Arc::new(FakeSession(AtomicBool::new(true))),
            notifier: Arc::new(RecordingNotifier::default()),
            refresh: Arc::new(CountingRefresh::default()),
        }
    }

    pub fn collaborators(&self) -> ChainCollaborators {
        ChainCollaborators {
            contract: self.contract.clone(),
            watcher: self.watcher.clone(),
            session: self.session.clone(),
            notifier: self.notifier.clone(),
        }
    }

    pub fn disconnect(&self) {
        self.session.0.store(false, Ordering::SeqCst);
    }
}
