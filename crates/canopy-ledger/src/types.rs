//! Certificate ledger data types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Literal stored while the on-chain id is still unknown
pub const PENDING: &str = "PENDING";

/// On-chain token identifier, or the pending sentinel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum TokenId {
    #[default]
    Pending,
    Assigned(String),
}

impl TokenId {
    #[inline]
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => PENDING,
            Self::Assigned(id) => id,
        }
    }
}

impl From<&str> for TokenId {
    fn from(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() || s == PENDING {
            Self::Pending
        } else {
            Self::Assigned(s.to_string())
        }
    }
}

impl From<String> for TokenId {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TokenId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TokenId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Accept numbers too: ledgers disagree on the JSON type of token ids.
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(s) => Ok(Self::from(s)),
            serde_json::Value::Number(n) => Ok(Self::Assigned(n.to_string())),
            serde_json::Value::Null => Ok(Self::Pending),
            other => Err(serde::de::Error::custom(format!("invalid token id: {other}"))),
        }
    }
}

/// What the certificate attests to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateSubject {
    /// Verified biomass score in percent
    Biomass(f64),
    /// Emergency certificate minted when a risk update could not be applied
    CriticalFireRisk,
}

/// Input for minting a certificate
#[derive(Debug, Clone, PartialEq)]
pub struct MintRequest {
    pub image: PathBuf,
    pub subject: CertificateSubject,
    pub lat: f64,
    pub lng: f64,
    pub carbon_tonnes: Option<f64>,
}

impl MintRequest {
    /// Human-readable certificate description
    #[must_use]
    pub fn description(&self) -> String {
        let mut text = match self.subject {
            CertificateSubject::Biomass(score) => format!(
                "Verified Carbon Credit.\nLocation: {}, {}\nBiomass Score: {score}%",
                self.lat, self.lng
            ),
            CertificateSubject::CriticalFireRisk => format!(
                "CRITICAL FIRE RISK.\nLocation: {}, {}",
                self.lat, self.lng
            ),
        };
        if let Some(carbon) = self.carbon_tonnes {
            text.push_str(&format!("\nCarbon: {carbon} t"));
        }
        text
    }
}

/// Normalized mint result; serializes in the ledger's response shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintReceipt {
    pub transaction_details: TransactionDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDetails {
    #[serde(rename = "transactionHash")]
    pub transaction_hash: Option<String>,
    #[serde(rename = "contractAddress")]
    pub contract_address: String,
    #[serde(rename = "tokenID")]
    pub token_id: TokenId,
}

impl MintReceipt {
    #[must_use]
    pub fn new(transaction_hash: Option<String>, contract_address: impl Into<String>, token_id: TokenId) -> Self {
        Self {
            transaction_details: TransactionDetails {
                transaction_hash,
                contract_address: contract_address.into(),
                token_id,
            },
        }
    }

    #[must_use]
    pub fn token_id(&self) -> &TokenId {
        &self.transaction_details.token_id
    }

    #[must_use]
    pub fn contract_address(&self) -> &str {
        &self.transaction_details.contract_address
    }

    #[must_use]
    pub fn transaction_hash(&self) -> Option<&str> {
        self.transaction_details.transaction_hash.as_deref()
    }
}

/// Status written onto an existing certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
    Normal,
    Critical,
}

impl CertificateStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub contract_address: String,
    pub token_id: String,
    pub status: CertificateStatus,
    pub carbon_tonnes: Option<f64>,
}

impl UpdateRequest {
    #[must_use]
    pub fn description(&self) -> String {
        let mut text = format!("STATUS UPDATE: {} RISK DETECTED.", self.status);
        if let Some(carbon) = self.carbon_tonnes {
            text.push_str(&format!(" Carbon: {carbon} t"));
        }
        text
    }
}
