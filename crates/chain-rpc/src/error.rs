use governance_client::TransactionError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RpcError {
    #[error("node unreachable: {0}")]
    Transport(String),

    /// Error object returned by the node.
    #[error("{message}")]
    Rpc { code: i64, message: String },

    #[error("malformed node response: {0}")]
    Malformed(String),

    #[error("no account available for signing")]
    NoAccount,

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RpcError::Malformed(err.to_string())
        } else {
            RpcError::Transport(err.to_string())
        }
    }
}

impl From<RpcError> for TransactionError {
    /// Anything that stops a transaction from being sent is a rejection.
    fn from(err: RpcError) -> Self {
        TransactionError::Rejected(err.to_string())
    }
}
