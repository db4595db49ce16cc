//! PENDING token reconciliation
//!
//! A mint can return before the token id is known. Given the mint's
//! transaction hash, read the receipt, decode the Transfer event and resolve
//! every PENDING record minted into the emitting contract.

use crate::error::CanopyError;
use crate::store::AuditStore;
use canopy_ledger::{minted_token, ChainReader};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Transaction not mined yet
    Pending,
    Resolved {
        token_id: String,
        contract_address: String,
        records_updated: usize,
    },
    /// Receipt exists but carries no Transfer event
    TokenNotFound,
}

#[derive(Clone)]
pub struct Reconciler {
    chain: Arc<dyn ChainReader>,
    audits: Arc<dyn AuditStore>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(chain: Arc<dyn ChainReader>, audits: Arc<dyn AuditStore>) -> Self {
        Self { chain, audits }
    }

    /// Resolve PENDING records from a mint transaction
    ///
    /// Running it again for the same hash updates nothing.
    ///
    /// # Errors
    /// [`CanopyError::InvalidRequest`] for a blank hash; chain and store
    /// failures otherwise.
    pub async fn sync(&self, tx_hash: &str) -> Result<SyncOutcome, CanopyError> {
        let tx_hash = tx_hash.trim();
        if tx_hash.is_empty() {
            return Err(CanopyError::InvalidRequest("transactionHash is required".into()));
        }

        let Some(receipt) = self.chain.transaction_receipt(tx_hash).await? else {
            tracing::info!(tx_hash, "transaction not mined yet");
            return Ok(SyncOutcome::Pending);
        };
        let Some(token) = minted_token(&receipt) else {
            tracing::warn!(tx_hash, logs = receipt.logs.len(), "no transfer event in receipt");
            return Ok(SyncOutcome::TokenNotFound);
        };

        let records_updated = self
            .audits
            .resolve_pending(&token.contract_address, &token.token_id)
            .await?;
        tracing::info!(
            tx_hash,
            token_id = %token.token_id,
            contract = %token.contract_address,
            records_updated,
            "pending certificates reconciled"
        );

        Ok(SyncOutcome::Resolved {
            token_id: token.token_id,
            contract_address: token.contract_address,
            records_updated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_ledger::{LedgerError, LogEntry, TransactionReceipt, TRANSFER_TOPIC};
    use mockall::mock;

    mock! {
        Chain {}
        #[async_trait::async_trait]
        impl ChainReader for Chain {
            async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TransactionReceipt>, LedgerError>;
        }
    }

    fn reconciler(chain: MockChain) -> Reconciler {
        Reconciler::new(Arc::new(chain), Arc::new(crate::store::InMemoryAuditStore::new()))
    }

    #[tokio::test]
    async fn blank_hash_is_a_client_error() {
        let mut chain = MockChain::new();
        chain.expect_transaction_receipt().never();
        let err = reconciler(chain).sync("  ").await.unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn unmined_is_pending() {
        let mut chain = MockChain::new();
        chain.expect_transaction_receipt().returning(|_| Ok(None));
        assert_eq!(reconciler(chain).sync("0xabc").await.unwrap(), SyncOutcome::Pending);
    }

    #[tokio::test]
    async fn approval_only_receipt_has_no_token() {
        let mut chain = MockChain::new();
        chain.expect_transaction_receipt().returning(|_| {
            Ok(Some(TransactionReceipt {
                transaction_hash: Some("0xabc".into()),
                status: Some("0x1".into()),
                logs: vec![LogEntry {
                    address: "0xC".into(),
                    topics: vec!["0x8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925".into()],
                }],
            }))
        });
        assert_eq!(reconciler(chain).sync("0xabc").await.unwrap(), SyncOutcome::TokenNotFound);
    }

    #[tokio::test]
    async fn resolves_with_nothing_pending() {
        let mut chain = MockChain::new();
        chain.expect_transaction_receipt().returning(|_| {
            Ok(Some(TransactionReceipt {
                transaction_hash: None,
                status: None,
                logs: vec![LogEntry {
                    address: "0xC".into(),
                    topics: vec![
                        TRANSFER_TOPIC.into(),
                        format!("0x{:064x}", 0),
                        format!("0x{:064x}", 1),
                        format!("0x{:064x}", 42),
                    ],
                }],
            }))
        });
        assert_eq!(
            reconciler(chain).sync("0xabc").await.unwrap(),
            SyncOutcome::Resolved {
                token_id: "42".into(),
                contract_address: "0xC".into(),
                records_updated: 0,
            }
        );
    }

    #[tokio::test]
    async fn chain_failure_propagates() {
        let mut chain = MockChain::new();
        chain
            .expect_transaction_receipt()
            .returning(|_| Err(LedgerError::Rpc { code: -32000, message: "header not found".into() }));
        let err = reconciler(chain).sync("0xabc").await.unwrap_err();
        assert!(matches!(err, CanopyError::Ledger(_)));
        assert!(!err.is_client_error());
    }
}
