//! Transaction receipts over Ethereum JSON-RPC

use crate::error::LedgerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// `keccak256("Transfer(address,address,uint256)")`
pub const TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

pub const DEFAULT_RPC_URL: &str = "https://ethereum-sepolia.publicnode.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

/// Token id recovered from a Transfer event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintedToken {
    /// Address of the contract that emitted the event
    pub contract_address: String,
    /// Decimal token id
    pub token_id: String,
}

/// Find the first ERC-721 Transfer log and decode its token id
#[must_use]
pub fn minted_token(receipt: &TransactionReceipt) -> Option<MintedToken> {
    receipt.logs.iter().find_map(|log| {
        let topic0 = log.topics.first()?;
        if !topic0.eq_ignore_ascii_case(TRANSFER_TOPIC) {
            return None;
        }
        let token_id = decode_uint(log.topics.get(3)?)?;
        Some(MintedToken {
            contract_address: log.address.clone(),
            token_id,
        })
    })
}

/// Decimal digits per limb in [`decode_uint`]
const LIMB_BASE: u64 = 1_000_000_000;

/// 32-byte hex topic to decimal, covering the full `uint256` range
fn decode_uint(topic: &str) -> Option<String> {
    let digits = topic.strip_prefix("0x").unwrap_or(topic);
    if digits.is_empty() || digits.len() > 64 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        tracing::warn!(topic, "token id topic not decodable");
        return None;
    }

    // Little-endian limbs in base 10^9
    let mut limbs: Vec<u64> = vec![0];
    for c in digits.chars() {
        let mut carry = u64::from(c.to_digit(16)?);
        for limb in &mut limbs {
            let value = *limb * 16 + carry;
            *limb = value % LIMB_BASE;
            carry = value / LIMB_BASE;
        }
        if carry > 0 {
            limbs.push(carry);
        }
    }

    let mut limbs = limbs.iter().rev();
    let mut decimal = limbs.next()?.to_string();
    for limb in limbs {
        decimal.push_str(&format!("{limb:09}"));
    }
    Some(decimal)
}

/// Read access to chain receipts
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// `None` while the transaction is not yet mined
    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TransactionReceipt>, LedgerError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub timeout_secs: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            timeout_secs: 5,
        }
    }
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

/// [`ChainReader`] using `eth_getTransactionReceipt`
#[derive(Debug, Clone)]
pub struct JsonRpcChain {
    http: reqwest::Client,
    config: ChainConfig,
}

impl JsonRpcChain {
    /// # Errors
    /// Returns [`LedgerError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: ChainConfig) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl ChainReader for JsonRpcChain {
    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TransactionReceipt>, LedgerError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": "eth_getTransactionReceipt",
            "params": [tx_hash],
            "id": 1
        });
        let response: RpcResponse = self
            .http
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(LedgerError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        match response.result {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| LedgerError::Decode(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warp::Filter;

    fn receipt(logs: Vec<LogEntry>) -> TransactionReceipt {
        TransactionReceipt {
            transaction_hash: Some("0xabc".into()),
            status: Some("0x1".into()),
            logs,
        }
    }

    #[test]
    fn transfer_topic_three_is_the_token_id() {
        let r = receipt(vec![
            LogEntry {
                address: "0xother".into(),
                topics: vec!["0x8c5be1e5".into()],
            },
            LogEntry {
                address: "0xC0DE".into(),
                topics: vec![
                    TRANSFER_TOPIC.to_uppercase().replace("0X", "0x"),
                    format!("0x{:064x}", 0),
                    format!("0x{:064x}", 0xbeef),
                    format!("0x{:064x}", 1234),
                ],
            },
        ]);
        assert_eq!(
            minted_token(&r),
            Some(MintedToken {
                contract_address: "0xC0DE".into(),
                token_id: "1234".into()
            })
        );
    }

    #[test]
    fn transfer_without_token_topic_is_ignored() {
        let r = receipt(vec![LogEntry {
            address: "0xC0DE".into(),
            topics: vec![TRANSFER_TOPIC.into()],
        }]);
        assert_eq!(minted_token(&r), None);
        assert_eq!(decode_uint(&format!("0x{:064x}", 0)), Some("0".into()));
    }

    #[test]
    fn token_ids_decode_across_the_uint256_range() {
        assert_eq!(decode_uint("0x2a"), Some("42".into()));
        assert_eq!(decode_uint(&format!("0x{:064x}", u128::MAX)), Some(u128::MAX.to_string()));
        assert_eq!(
            decode_uint(&format!("0x{:032x}{:032x}", 1, 0)),
            Some("340282366920938463463374607431768211456".into())
        );
        assert_eq!(
            decode_uint(&format!("0x{}", "f".repeat(64))),
            Some("115792089237316195423570985008687907853269984665640564039457584007913129639935".into())
        );
        assert_eq!(decode_uint("0x"), None);
        assert_eq!(decode_uint("0xzz"), None);
        assert_eq!(decode_uint(&format!("0x{}", "1".repeat(65))), None);
    }

    #[test]
    fn oversized_token_id_is_still_found() {
        let r = receipt(vec![LogEntry {
            address: "0xC0DE".into(),
            topics: vec![
                TRANSFER_TOPIC.into(),
                format!("0x{:064x}", 0),
                format!("0x{:064x}", 0xbeef),
                format!("0x{}", "f".repeat(64)),
            ],
        }]);
        let token = minted_token(&r).unwrap();
        assert_eq!(token.token_id.len(), 78);
    }

    async fn rpc(reply: Value) -> JsonRpcChain {
        let route = warp::post().map(move || warp::reply::json(&reply));
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        JsonRpcChain::new(ChainConfig {
            rpc_url: format!("http://{addr}"),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn null_result_is_pending() {
        let chain = rpc(json!({"jsonrpc": "2.0", "id": 1, "result": null})).await;
        assert!(chain.transaction_receipt("0xabc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn receipt_is_decoded() {
        let chain = rpc(json!({"jsonrpc": "2.0", "id": 1, "result": {
            "transactionHash": "0xabc",
            "status": "0x1",
            "logs": [{"address": "0xC0DE", "topics": [TRANSFER_TOPIC, "0x0", "0x1", "0x2a"], "data": "0x"}]
        }}))
        .await;
        let receipt = chain.transaction_receipt("0xabc").await.unwrap().unwrap();
        assert_eq!(minted_token(&receipt).unwrap().token_id, "42");
    }

    #[tokio::test]
    async fn rpc_error_object_is_surfaced() {
        let chain = rpc(json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32602, "message": "invalid argument"}})).await;
        let err = chain.transaction_receipt("bad").await.unwrap_err();
        assert!(matches!(err, LedgerError::Rpc { code: -32602, .. }));
    }
}
