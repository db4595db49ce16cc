//! Canopy Certificate Ledger
//!
//! Adapters for the certificate service (mint, status update) and for
//! reading transaction receipts back from the chain. Token-id field variants
//! from the service are normalized here into [`TokenId`].

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod chain;
mod error;
mod types;
mod verbwire;

pub use chain::{
    minted_token, ChainConfig, ChainReader, JsonRpcChain, LogEntry, MintedToken,
    TransactionReceipt, DEFAULT_RPC_URL, TRANSFER_TOPIC,
};
pub use error::LedgerError;
pub use types::{
    CertificateStatus, CertificateSubject, MintReceipt, MintRequest, TokenId, TransactionDetails,
    UpdateRequest, PENDING,
};
pub use verbwire::{normalize_mint_response, LedgerConfig, VerbwireLedger, DEFAULT_BASE_URL};

use async_trait::async_trait;

/// Certificate issuing service
///
/// `Ok(None)` means the service declined; callers treat it as a soft failure.
#[async_trait]
pub trait CertificateLedger: Send + Sync {
    async fn mint(&self, request: &MintRequest) -> Result<Option<MintReceipt>, LedgerError>;

    async fn update_status(
        &self,
        request: &UpdateRequest,
    ) -> Result<Option<serde_json::Value>, LedgerError>;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
