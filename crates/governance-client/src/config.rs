//! Client configuration

use crate::circuit_breaker::CircuitBreakerConfig;
use std::time::Duration;

/// Default GraphQL indexer endpoint
pub const DEFAULT_INDEXER_URL: &str = "http://localhost:42069";

/// Number of candidate proposal ids queried per fetch cycle
pub const DEFAULT_CANDIDATE_COUNT: u64 = 10;

/// Opaque hook payload attached to every vote
pub const DEFAULT_VOTE_HOOK_DATA: &[u8] = &[0x12];

/// Proposal fetching configuration
#[derive(Clone, Debug)]
pub struct FetcherConfig {
    /// Candidate ids `0..candidate_count` are queried each cycle
    pub candidate_count: u64,
    /// Interval between background refreshes
    pub poll_interval: Duration,
    /// Per-request timeout for indexer queries
    pub request_timeout: Duration,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            candidate_count: DEFAULT_CANDIDATE_COUNT,
            poll_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Vote submission configuration
#[derive(Clone, Debug)]
pub struct VoteConfig {
    /// Confirmations awaited before a vote counts as recorded
    pub confirmations: u64,
    /// Upper bound on the confirmation wait. `None` waits forever.
    pub confirmation_timeout: Option<Duration>,
    /// Hook data passed to `castVote`
    pub hook_data: Vec<u8>,
}

impl Default for VoteConfig {
    fn default() -> Self {
        Self {
            confirmations: 1,
            confirmation_timeout: Some(Duration::from_secs(300)),
            hook_data: DEFAULT_VOTE_HOOK_DATA.to_vec(),
        }
    }
}

/// Top-level configuration for a governance client session
#[derive(Clone, Debug)]
pub struct GovernanceConfig {
    pub indexer_url: String,
    pub fetcher: FetcherConfig,
    pub votes: VoteConfig,
    pub proposals: crate::composer::ComposerConfig,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            indexer_url: DEFAULT_INDEXER_URL.to_string(),
            fetcher: FetcherConfig::default(),
            votes: VoteConfig::default(),
            proposals: crate::composer::ComposerConfig::default(),
        }
    }
}
