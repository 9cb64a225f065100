//! Chain RPC
//!
//! Ethereum JSON-RPC implementation of the governance client's contract,
//! confirmation and session collaborators. Transactions are signed by the
//! node through `eth_sendTransaction`; no keys are handled here.

pub mod abi;
pub mod client;
pub mod config;
pub mod error;

pub use client::ChainRpcClient;
pub use config::{ChainConfig, DEFAULT_CONTRACT_ADDRESS, DEFAULT_RPC_URL};
pub use error::RpcError;
