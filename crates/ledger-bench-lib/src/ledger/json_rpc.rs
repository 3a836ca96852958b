// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! [`LedgerClient`] over Ethereum-style JSON-RPC 2.0 on HTTP.
//!
//! The node signs with an unlocked account (`eth_sendTransaction`), and the
//! per-client block cursor is a `eth_newBlockFilter` filter installed at
//! connect time.

use crate::{
    ledger::{LedgerClient, LedgerConnector, LedgerError},
    types::{AccountIdentity, Address, BlockId, LedgerTransaction, Transfer, TxnId},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tracing::{debug, info};
use url::Url;

const DEFAULT_UNLOCK_DURATION_SECS: u64 = 0;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTransaction {
    hash: String,
    from: String,
    #[serde(default)]
    to: Option<String>,
    value: String,
    nonce: String,
    #[serde(default)]
    block_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcBlock {
    transactions: Vec<String>,
}

#[derive(Debug)]
struct RpcTransport {
    http: reqwest::Client,
    url: Url,
    next_id: AtomicU64,
}

impl RpcTransport {
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, LedgerError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let body: Value = self
            .http
            .post(self.url.clone())
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        decode_response(body)
    }
}

fn decode_response<T: DeserializeOwned>(body: Value) -> Result<T, LedgerError> {
    let response: RpcResponse =
        serde_json::from_value(body).map_err(|e| LedgerError::Decode(e.to_string()))?;
    if let Some(error) = response.error {
        return Err(LedgerError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    serde_json::from_value(response.result.unwrap_or(Value::Null))
        .map_err(|e| LedgerError::Decode(e.to_string()))
}

fn to_quantity(value: u64) -> String {
    format!("{:#x}", value)
}

fn parse_quantity(quantity: &str) -> Result<u128, LedgerError> {
    let digits = quantity
        .strip_prefix("0x")
        .ok_or_else(|| LedgerError::Decode(format!("quantity {:?} is not 0x-prefixed", quantity)))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| LedgerError::Decode(format!("quantity {:?}: {}", quantity, e)))
}

fn parse_nonce(quantity: &str) -> Result<u64, LedgerError> {
    u64::try_from(parse_quantity(quantity)?)
        .map_err(|_| LedgerError::Decode(format!("nonce {:?} overflows u64", quantity)))
}

impl TryFrom<RpcTransaction> for LedgerTransaction {
    type Error = LedgerError;

    fn try_from(txn: RpcTransaction) -> Result<Self, Self::Error> {
        Ok(LedgerTransaction {
            amount: parse_quantity(&txn.value)?,
            nonce: parse_nonce(&txn.nonce)?,
            id: TxnId::new(txn.hash),
            from: txn.from,
            to: txn.to,
            block: txn.block_hash.map(BlockId::new),
        })
    }
}

#[derive(Debug)]
pub struct EthJsonRpcClient {
    rpc: RpcTransport,
    filter_id: String,
}

#[async_trait]
impl LedgerClient for EthJsonRpcClient {
    async fn submit_transfer(&self, transfer: &Transfer) -> Result<TxnId, LedgerError> {
        let hash: String = self
            .rpc
            .call(
                "eth_sendTransaction",
                json!([{
                    "from": transfer.from.as_str(),
                    "to": transfer.to.as_str(),
                    "value": to_quantity(transfer.amount),
                    "gas": to_quantity(transfer.gas_limit),
                    "nonce": to_quantity(transfer.nonce),
                }]),
            )
            .await?;
        Ok(TxnId::new(hash))
    }

    async fn fetch_new_blocks(&self) -> Result<Vec<BlockId>, LedgerError> {
        let hashes: Vec<String> = self
            .rpc
            .call("eth_getFilterChanges", json!([self.filter_id]))
            .await?;
        Ok(hashes.into_iter().map(BlockId::new).collect())
    }

    async fn fetch_block_transactions(&self, block: &BlockId) -> Result<Vec<TxnId>, LedgerError> {
        let block_body: Option<RpcBlock> = self
            .rpc
            .call("eth_getBlockByHash", json!([block.as_str(), false]))
            .await?;
        match block_body {
            Some(body) => Ok(body.transactions.into_iter().map(TxnId::new).collect()),
            None => Err(LedgerError::NotFound(block.to_string())),
        }
    }

    async fn fetch_transaction(&self, id: &TxnId) -> Result<LedgerTransaction, LedgerError> {
        let txn: Option<RpcTransaction> = self
            .rpc
            .call("eth_getTransactionByHash", json!([id.as_str()]))
            .await?;
        txn.ok_or_else(|| LedgerError::NotFound(id.to_string()))?
            .try_into()
    }

    async fn fetch_account_nonce(&self, address: &Address) -> Result<u64, LedgerError> {
        let count: String = self
            .rpc
            .call("eth_getTransactionCount", json!([address.as_str(), "pending"]))
            .await?;
        parse_nonce(&count)
    }
}

/// Connects every worker node to the same JSON-RPC endpoint, each with its
/// own HTTP connection pool and block filter.
#[derive(Clone, Debug)]
pub struct EthJsonRpcConnector {
    url: Url,
    unlock_duration_secs: u64,
    request_timeout: Duration,
}

impl EthJsonRpcConnector {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            unlock_duration_secs: DEFAULT_UNLOCK_DURATION_SECS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// How long the node keeps accounts unlocked. 0 keeps them unlocked
    /// until the node restarts.
    pub fn unlock_duration_secs(mut self, secs: u64) -> Self {
        self.unlock_duration_secs = secs;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn transport(&self) -> Result<RpcTransport, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()?;
        Ok(RpcTransport {
            http,
            url: self.url.clone(),
            next_id: AtomicU64::new(1),
        })
    }

    /// A client that only reads the chain: no account is unlocked.
    pub async fn read_only_client(&self) -> Result<EthJsonRpcClient, LedgerError> {
        Self::with_block_filter(self.transport()?).await
    }

    async fn with_block_filter(rpc: RpcTransport) -> Result<EthJsonRpcClient, LedgerError> {
        let filter_id: String = rpc.call("eth_newBlockFilter", json!([])).await?;
        Ok(EthJsonRpcClient { rpc, filter_id })
    }
}

#[async_trait]
impl LedgerConnector for EthJsonRpcConnector {
    async fn connect(
        &self,
        identity: &AccountIdentity,
    ) -> Result<Arc<dyn LedgerClient>, LedgerError> {
        let rpc = self.transport()?;
        if let Some(password) = &identity.password {
            let unlocked: bool = rpc
                .call(
                    "personal_unlockAccount",
                    json!([identity.address, password, self.unlock_duration_secs]),
                )
                .await?;
            if !unlocked {
                return Err(LedgerError::Rpc {
                    code: 0,
                    message: format!("node refused to unlock {}", identity.address),
                });
            }
            debug!(address = %identity.address, "Unlocked account");
        }
        let client = Self::with_block_filter(rpc).await?;
        info!(
            address = %identity.address,
            endpoint = %self.url,
            filter = %client.filter_id,
            "Connected to ledger"
        );
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::{assert_err, assert_matches, assert_ok, assert_ok_eq};

    #[test]
    fn quantities() {
        assert_eq!(to_quantity(21000), "0x5208");
        assert_eq!(to_quantity(0), "0x0");
        assert_ok_eq!(parse_quantity("0x186a0"), 100_000);
        assert_ok_eq!(parse_quantity("0x"), 0);
        assert_err!(parse_quantity("186a0"));
        assert_err!(parse_quantity("0xzz"));
        assert_err!(parse_nonce("0x1ffffffffffffffff"));
    }

    #[test]
    fn decode_result_and_error() {
        let hash: String = assert_ok!(decode_response(json!({
            "jsonrpc": "2.0", "id": 1, "result": "0xabc"
        })));
        assert_eq!(hash, "0xabc");

        let err = decode_response::<String>(json!({
            "jsonrpc": "2.0", "id": 2, "error": {"code": -32000, "message": "nonce too low"}
        }))
        .unwrap_err();
        assert_eq!(err, LedgerError::Rpc {
            code: -32000,
            message: "nonce too low".to_string()
        });

        // A null result is only acceptable where the caller expects one.
        let missing: Option<RpcTransaction> =
            assert_ok!(decode_response(json!({"jsonrpc": "2.0", "id": 3, "result": null})));
        assert!(missing.is_none());
        assert_matches!(
            decode_response::<String>(json!({"jsonrpc": "2.0", "id": 4, "result": null})),
            Err(LedgerError::Decode(_))
        );
    }

    #[test]
    fn transaction_conversion() {
        let rpc: RpcTransaction = serde_json::from_value(json!({
            "hash": "0x01",
            "from": "0xaa",
            "to": "0xbb",
            "value": "0x186a0",
            "nonce": "0x7",
            "blockHash": "0xff",
            "gas": "0x5208"
        }))
        .unwrap();
        let txn = LedgerTransaction::try_from(rpc).unwrap();
        assert_eq!(txn.id, TxnId::new("0x01"));
        assert_eq!(txn.amount, 100_000);
        assert_eq!(txn.nonce, 7);
        assert!(txn.is_included());

        let pending: RpcTransaction = serde_json::from_value(json!({
            "hash": "0x02", "from": "0xaa", "value": "0x1", "nonce": "0x0", "blockHash": null
        }))
        .unwrap();
        let txn = LedgerTransaction::try_from(pending).unwrap();
        assert!(!txn.is_included());
        assert_eq!(txn.to, None);
    }
}
