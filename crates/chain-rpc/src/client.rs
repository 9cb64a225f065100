//! JSON-RPC client for the governance contract

use crate::abi;
use crate::config::ChainConfig;
use crate::error::RpcError;
use async_trait::async_trait;
use governance_client::{
    CastVoteParams, ConfirmationWatcher, CreateProposalParams, GovernanceContract,
    ReceiptStatus, Session, TransactionError, TxHash,
};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

#[derive(Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct Response<T> {
    result: Option<T>,
    error: Option<ErrorObject>,
}

#[derive(Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: Option<String>,
    pub block_number: Option<String>,
    /// `0x1` on success, `0x0` when reverted
    pub status: Option<String>,
}

impl Receipt {
    pub fn receipt_status(&self) -> ReceiptStatus {
        match self.status.as_deref() {
            Some("0x0") => ReceiptStatus::Reverted,
            _ => ReceiptStatus::Success,
        }
    }
}

fn parse_quantity(value: &str) -> Result<u64, RpcError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    u64::from_str_radix(digits, 16)
        .map_err(|_| RpcError::Malformed(format!("invalid quantity {value:?}")))
}

pub struct ChainRpcClient {
    http: reqwest::Client,
    config: ChainConfig,
    next_id: AtomicU64,
    /// Account resolved from `eth_accounts`, when none is configured
    resolved_account: RwLock<Option<String>>,
}

impl ChainRpcClient {
    pub fn new(config: ChainConfig) -> Result<Self, RpcError> {
        abi::parse_address(&config.contract)?;
        if let Some(account) = &config.account {
            abi::parse_address(account)?;
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            config,
            next_id: AtomicU64::new(1),
            resolved_account: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    async fn call_optional<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, RpcError> {
        let request = Request {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .http
            .post(&self.config.rpc_url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Transport(format!("{method} returned HTTP {status}")));
        }

        let body: Response<T> = response.json().await?;
        if let Some(error) = body.error {
            debug!(method, code = error.code, message = %error.message, "Node returned error");
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(body.result)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        self.call_optional(method, params)
            .await?
            .ok_or_else(|| RpcError::Malformed(format!("{method} returned no result")))
    }

    pub async fn accounts(&self) -> Result<Vec<String>, RpcError> {
        self.call("eth_accounts", json!([])).await
    }

    /// Account transactions are sent from.
    pub async fn sender(&self) -> Result<String, RpcError> {
        if let Some(account) = &self.config.account {
            return Ok(account.clone());
        }
        if let Some(account) = self.resolved_account.read().clone() {
            return Ok(account);
        }

        let account = self
            .accounts()
            .await?
            .into_iter()
            .next()
            .ok_or(RpcError::NoAccount)?;
        info!(account = %account, "Using node account for signing");
        *self.resolved_account.write() = Some(account.clone());
        Ok(account)
    }

    pub async fn block_number(&self) -> Result<u64, RpcError> {
        let quantity: String = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&quantity)
    }

    /// Receipt of a mined transaction; `None` while it is pending.
    pub async fn transaction_receipt(&self, tx: &TxHash) -> Result<Option<Receipt>, RpcError> {
        self.call_optional("eth_getTransactionReceipt", json!([tx.0]))
            .await
    }

    /// Send a call to the governance contract, signed by the node.
    pub async fn send_transaction(&self, data: Vec<u8>) -> Result<TxHash, RpcError> {
        let from = self.sender().await?;
        let tx = json!({
            "from": from,
            "to": self.config.contract,
            "data": format!("0x{}", hex::encode(data)),
        });
        let hash: String = self.call("eth_sendTransaction", json!([tx])).await?;
        debug!(tx = %hash, "Transaction submitted");
        Ok(TxHash(hash))
    }

    /// Poll until the receipt is mined and deep enough. Transport errors are
    /// retried on the next tick; callers bound the wait.
    async fn poll_receipt(&self, tx: &TxHash, confirmations: u64) -> Result<ReceiptStatus, RpcError> {
        let mut interval = tokio::time::interval(self.config.receipt_poll_interval);

        let (receipt, mined_at) = loop {
            interval.tick().await;
            match self.transaction_receipt(tx).await {
                Ok(Some(receipt)) => match receipt.block_number.as_deref() {
                    Some(block) => {
                        let block = parse_quantity(block)?;
                        break (receipt, block);
                    }
                    None => debug!(tx = %tx, "Receipt has no block yet"),
                },
                Ok(None) => debug!(tx = %tx, "Transaction pending"),
                Err(RpcError::Transport(reason)) => {
                    warn!(tx = %tx, %reason, "Receipt poll failed, retrying");
                }
                Err(e) => return Err(e),
            }
        };

        let status = receipt.receipt_status();
        if status == ReceiptStatus::Reverted || confirmations <= 1 {
            return Ok(status);
        }

        loop {
            match self.block_number().await {
                Ok(head) if head.saturating_sub(mined_at) + 1 >= confirmations => {
                    return Ok(status)
                }
                Ok(_) => {}
                Err(RpcError::Transport(reason)) => {
                    warn!(tx = %tx, %reason, "Block number poll failed, retrying");
                }
                Err(e) => return Err(e),
            }
            interval.tick().await;
        }
    }
}

#[async_trait]
impl Session for ChainRpcClient {
    async fn is_connected(&self) -> bool {
        match self.sender().await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "No signing account available");
                false
            }
        }
    }
}

#[async_trait]
impl GovernanceContract for ChainRpcClient {
    async fn create_proposal(
        &self,
        params: CreateProposalParams,
    ) -> Result<TxHash, TransactionError> {
        let data = abi::encode_create_proposal(&params)?;
        Ok(self.send_transaction(data).await?)
    }

    async fn cast_vote(&self, params: CastVoteParams) -> Result<TxHash, TransactionError> {
        Ok(self.send_transaction(abi::encode_cast_vote(&params)).await?)
    }

    async fn execute_proposal(&self, proposal_id: u64) -> Result<TxHash, TransactionError> {
        Ok(self
            .send_transaction(abi::encode_execute_proposal(proposal_id))
            .await?)
    }
}

#[async_trait]
impl ConfirmationWatcher for ChainRpcClient {
    async fn wait_for_receipt(
        &self,
        tx: &TxHash,
        confirmations: u64,
    ) -> Result<ReceiptStatus, TransactionError> {
        self.poll_receipt(tx, confirmations)
            .await
            .map_err(|e| TransactionError::Failed(e.to_string()))
    }
}
