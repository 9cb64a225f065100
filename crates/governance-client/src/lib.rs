//! Governance Client
//!
//! Client-side core of the network-state governance front-end. Provides:
//! - Proposal fetching from the GraphQL indexer, with a cached proposal set
//! - Search filtering over the cached set
//! - Vote coordination with duplicate and in-flight guards
//! - Proposal creation and execution
//! - Countdown and voting-window helpers
//!
//! Chain access goes through the traits in [`collaborators`]; the
//! `chain-rpc` crate provides the JSON-RPC implementation.

pub mod circuit_breaker;
pub mod collaborators;
pub mod composer;
pub mod config;
pub mod countdown;
pub mod error;
pub mod fetcher;
pub mod filter;
pub mod indexer;
pub mod proposal;
pub mod votes;

#[cfg(test)]
pub(crate) mod testing;

pub use circuit_breaker::{CircuitBreakerConfig, CircuitState, IndexerCircuitBreaker};
pub use collaborators::*;
pub use composer::{ComposerConfig, ProposalComposer, ProposalDraft};
pub use config::*;
pub use countdown::{now_unix, Countdown, VotingWindow};
pub use error::{
    friendly_reason, ComposeError, FetchError, IndexerError, TransactionError, VoteError,
};
pub use fetcher::{ProposalFetcher, ProposalStore};
pub use filter::{filter_by_uri, ProposalView};
pub use indexer::{GraphqlIndexer, ProposalIndexer};
pub use proposal::{DecodeError, ExecutedProposal, Proposal, VoteCast, VoteDirection};
pub use votes::{VoteCoordinator, VoteState};

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Fully wired client: one indexer, one store, and the coordinators that
/// share them.
pub struct GovernanceClient {
    indexer: GraphqlIndexer,
    fetcher: Arc<ProposalFetcher>,
    votes: VoteCoordinator,
    composer: ProposalComposer,
}

impl GovernanceClient {
    /// Build a client against the configured indexer and the given chain
    /// collaborators. Nothing is fetched until [`refresh`] or [`start`].
    ///
    /// [`refresh`]: GovernanceClient::refresh
    /// [`start`]: GovernanceClient::start
    pub fn new(config: GovernanceConfig, chain: ChainCollaborators) -> Result<Self, IndexerError> {
        let indexer = GraphqlIndexer::new(&config.indexer_url, config.fetcher.request_timeout)?;
        info!(indexer = %config.indexer_url, "Governance client configured");
        Ok(Self::with_indexer(config, indexer, chain))
    }

    pub fn with_indexer(
        config: GovernanceConfig,
        indexer: GraphqlIndexer,
        chain: ChainCollaborators,
    ) -> Self {
        let store = Arc::new(ProposalStore::new());
        let fetcher = Arc::new(ProposalFetcher::new(
            Arc::new(indexer.clone()),
            store.clone(),
            &config.fetcher,
        ));
        let votes = VoteCoordinator::new(chain.clone(), fetcher.clone(), store, config.votes);
        let composer = ProposalComposer::new(chain, fetcher.clone(), config.proposals);

        Self {
            indexer,
            fetcher,
            votes,
            composer,
        }
    }

    pub fn store(&self) -> &Arc<ProposalStore> {
        self.fetcher.store()
    }

    pub fn indexer(&self) -> &GraphqlIndexer {
        &self.indexer
    }

    pub fn votes(&self) -> &VoteCoordinator {
        &self.votes
    }

    pub fn composer(&self) -> &ProposalComposer {
        &self.composer
    }

    pub async fn refresh(&self) -> Result<Arc<Vec<Proposal>>, FetchError> {
        self.fetcher.refresh().await
    }

    /// Start background polling. Abort the handle to stop.
    pub fn start(&self) -> JoinHandle<()> {
        self.fetcher.start()
    }

    /// Cached proposals whose uri matches `query`.
    pub fn search(&self, query: &str) -> Vec<Proposal> {
        filter_by_uri(&self.store().snapshot(), query)
    }
}
