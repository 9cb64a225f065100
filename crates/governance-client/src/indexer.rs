//! GraphQL indexer client
//!
//! The indexer exposes contract events as GraphQL entities. Every numeric
//! field comes back as a decimal string and is decoded into [`Proposal`] /
//! [`VoteCast`] here.

use crate::error::IndexerError;
use crate::proposal::{
    ExecutedProposal, Proposal, RawExecutedProposal, RawProposal, RawVoteCast, VoteCast,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const PROPOSAL_BY_ID_QUERY: &str = r#"
query GetProposals($id: BigInt!) {
  proposals(id: $id) {
    id
    proposerId
    uri
    startTime
    endTime
    forScore
    againstScore
    executed
  }
}"#;

const LATEST_PROPOSALS_QUERY: &str = r#"
query LatestProposals($first: Int!) {
  proposals(orderDirection: "desc", orderBy: "startTime", first: $first) {
    id
    proposerId
    uri
    startTime
    endTime
    forScore
    againstScore
    executed
  }
}"#;

const EXECUTED_PROPOSALS_QUERY: &str = r#"
query ExecutedProposals($first: Int!) {
  proposals(where: { executed: true }, orderDirection: "desc", orderBy: "startTime", first: $first) {
    id
    executed
  }
}"#;

const RECENT_VOTES_QUERY: &str = r#"
query RecentVotes($first: Int!) {
  votes(orderDirection: "desc", orderBy: "proposalId", first: $first) {
    proposalId
    voterId
    weight
  }
}"#;

/// Source of proposal records keyed by candidate id.
#[async_trait]
pub trait ProposalIndexer: Send + Sync {
    /// Proposals the indexer holds for `id`. An unknown id is an empty list,
    /// not an error.
    async fn proposals_by_id(&self, id: u64) -> Result<Vec<Proposal>, IndexerError>;
}

#[derive(Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlErrorEntry>,
}

#[derive(Deserialize)]
struct GraphqlErrorEntry {
    message: String,
}

#[derive(Deserialize)]
struct ProposalsData<T> {
    #[serde(default = "Vec::new")]
    proposals: Vec<T>,
}

#[derive(Deserialize)]
struct VotesData {
    #[serde(default)]
    votes: Vec<RawVoteCast>,
}

/// HTTP client for the GraphQL indexer
#[derive(Clone)]
pub struct GraphqlIndexer {
    endpoint: String,
    client: reqwest::Client,
}

impl GraphqlIndexer {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, IndexerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(endpoint, client))
    }

    pub fn with_client(endpoint: &str, client: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, IndexerError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&GraphqlRequest { query, variables })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexerError::Transport(format!(
                "{} responded with {}",
                self.endpoint, status
            )));
        }

        let body: GraphqlResponse<T> = response.json().await?;
        if !body.errors.is_empty() {
            let messages: Vec<_> = body.errors.into_iter().map(|e| e.message).collect();
            return Err(IndexerError::Query(messages.join("; ")));
        }

        body.data
            .ok_or_else(|| IndexerError::Malformed("response has no data".to_string()))
    }

    /// Most recently started proposals, newest first.
    pub async fn latest_proposals(&self, first: usize) -> Result<Vec<Proposal>, IndexerError> {
        let data: ProposalsData<RawProposal> = self
            .request(LATEST_PROPOSALS_QUERY, json!({ "first": first }))
            .await?;
        decode_all(data.proposals)
    }

    /// Proposals the contract has executed, newest first.
    pub async fn executed_proposals(
        &self,
        first: usize,
    ) -> Result<Vec<ExecutedProposal>, IndexerError> {
        let data: ProposalsData<RawExecutedProposal> = self
            .request(EXECUTED_PROPOSALS_QUERY, json!({ "first": first }))
            .await?;
        decode_all(data.proposals)
    }

    /// Latest vote casts ordered by proposal id, highest first.
    pub async fn recent_votes(&self, first: usize) -> Result<Vec<VoteCast>, IndexerError> {
        let data: VotesData = self
            .request(RECENT_VOTES_QUERY, json!({ "first": first }))
            .await?;
        decode_all(data.votes)
    }
}

fn decode_all<R, T>(raw: Vec<R>) -> Result<Vec<T>, IndexerError>
where
    T: TryFrom<R, Error = crate::proposal::DecodeError>,
{
    raw.into_iter()
        .map(|r| T::try_from(r).map_err(IndexerError::from))
        .collect()
}

#[async_trait]
impl ProposalIndexer for GraphqlIndexer {
    async fn proposals_by_id(&self, id: u64) -> Result<Vec<Proposal>, IndexerError> {
        let data: ProposalsData<RawProposal> = self
            .request(PROPOSAL_BY_ID_QUERY, json!({ "id": id.to_string() }))
            .await?;
        debug!(id, count = data.proposals.len(), "Indexer returned proposals");
        decode_all(data.proposals)
    }
}
