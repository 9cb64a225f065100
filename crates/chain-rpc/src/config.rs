use std::time::Duration;

/// Default JSON-RPC endpoint of the signing node
pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";

/// Deployed governance contract
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x49ae0951c8b9e8ee731c7c10f98ab81f40f6058d";

#[derive(Clone, Debug)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub contract: String,
    /// Sending account. When unset, the node's first unlocked account is used.
    pub account: Option<String>,
    /// Delay between receipt and block-number polls
    pub receipt_poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            contract: DEFAULT_CONTRACT_ADDRESS.to_string(),
            account: None,
            receipt_poll_interval: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
        }
    }
}
