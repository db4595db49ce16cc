//! Verbwire NFT API adapter
//!
//! Provider rejections (non-2xx, missing `transaction_details`) come back as
//! `Ok(None)` so callers can fall back; only transport-level failures are
//! errors.

use crate::error::LedgerError;
use crate::types::{MintReceipt, MintRequest, TokenId, UpdateRequest, CertificateStatus};
use crate::CertificateLedger;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.verbwire.com/v1";

/// Verbwire connection and certificate presentation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Contract certificates are minted into
    pub contract_address: String,
    pub chain: String,
    /// Certificate names are `<prefix> #<4 digits>`
    pub name_prefix: String,
    pub normal_image_url: String,
    pub critical_image_url: String,
    pub timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            contract_address: "0x0D29A715d3a1E0763EB039D84ec8782b75C63F3e".to_string(),
            chain: "sepolia".to_string(),
            name_prefix: "Canopy Credit".to_string(),
            normal_image_url:
                "https://raw.githubusercontent.com/PokeAPI/sprites/master/sprites/items/leaf-stone.png"
                    .to_string(),
            critical_image_url:
                "https://raw.githubusercontent.com/PokeAPI/sprites/master/sprites/items/flame-orb.png"
                    .to_string(),
            timeout_secs: 60,
        }
    }
}

impl LedgerConfig {
    #[inline]
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_contract(mut self, address: impl Into<String>) -> Self {
        self.contract_address = address.into();
        self
    }
}

/// [`CertificateLedger`] over the Verbwire REST API
#[derive(Debug, Clone)]
pub struct VerbwireLedger {
    http: reqwest::Client,
    config: LedgerConfig,
}

impl VerbwireLedger {
    /// # Errors
    /// Returns [`LedgerError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    fn api_key(&self) -> Result<&str, LedgerError> {
        self.config
            .api_key
            .as_deref()
            .ok_or(LedgerError::MissingCredentials)
    }

    fn certificate_name(&self) -> String {
        let suffix = chrono::Utc::now().timestamp_millis().rem_euclid(10_000);
        format!("{} #{suffix:04}", self.config.name_prefix)
    }

    fn image_for(&self, status: CertificateStatus) -> &str {
        match status {
            CertificateStatus::Critical => &self.config.critical_image_url,
            CertificateStatus::Normal => &self.config.normal_image_url,
        }
    }
}

/// Pull a receipt out of a mint response, whichever token-id spelling it uses
#[must_use]
pub fn normalize_mint_response(body: &Value, default_contract: &str) -> Option<MintReceipt> {
    let details = body.get("transaction_details")?.as_object()?;

    let token_id = ["tokenID", "tokenId", "token_id"]
        .iter()
        .filter_map(|key| details.get(*key))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(TokenId::from(s.as_str())),
            Value::Number(n) => Some(TokenId::Assigned(n.to_string())),
            _ => None,
        })
        .unwrap_or(TokenId::Pending);

    let contract = details
        .get("contractAddress")
        .and_then(Value::as_str)
        .unwrap_or(default_contract);

    Some(MintReceipt::new(
        details
            .get("transactionHash")
            .and_then(Value::as_str)
            .map(str::to_string),
        contract,
        token_id,
    ))
}

#[async_trait]
impl CertificateLedger for VerbwireLedger {
    async fn mint(&self, request: &MintRequest) -> Result<Option<MintReceipt>, LedgerError> {
        let key = self.api_key()?;
        let image = tokio::fs::read(&request.image).await?;
        let file_name = request
            .image
            .file_name()
            .map_or_else(|| "certificate.png".to_string(), |n| n.to_string_lossy().into_owned());

        let form = Form::new()
            .part("filePath", Part::bytes(image).file_name(file_name).mime_str("image/png")?)
            .text("name", self.certificate_name())
            .text("description", request.description())
            .text("contractAddress", self.config.contract_address.clone())
            .text("chain", self.config.chain.clone());

        tracing::info!(contract = %self.config.contract_address, "minting certificate");
        let response = self
            .http
            .post(format!("{}/nft/mint/mintFromFile", self.config.base_url))
            .header("X-API-Key", key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            tracing::warn!(%status, body = %text, "ledger rejected mint");
            return Ok(None);
        }

        let Ok(body) = serde_json::from_str::<Value>(&text) else {
            tracing::warn!(body = %text, "mint response was not JSON");
            return Ok(None);
        };
        tracing::debug!(response = %body, "mint response");

        let receipt = normalize_mint_response(&body, &self.config.contract_address);
        match &receipt {
            Some(r) => tracing::info!(token_id = %r.token_id(), "certificate minted"),
            None => tracing::warn!(response = %body, "mint response had no transaction details"),
        }
        Ok(receipt)
    }

    async fn update_status(&self, request: &UpdateRequest) -> Result<Option<Value>, LedgerError> {
        let key = self.api_key()?;
        let form = Form::new()
            .text("contractAddress", request.contract_address.clone())
            .text("tokenId", request.token_id.clone())
            .text("chain", self.config.chain.clone())
            .text("imageUrl", self.image_for(request.status).to_string())
            .text("description", request.description());

        tracing::info!(token_id = %request.token_id, status = %request.status, "updating certificate");
        let response = self
            .http
            .post(format!("{}/nft/update/metadata", self.config.base_url))
            .header("X-API-Key", key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            tracing::warn!(%status, body = %text, "ledger rejected status update");
            return Ok(None);
        }
        Ok(Some(
            serde_json::from_str(&text).unwrap_or(Value::String(text)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CertificateSubject;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use warp::Filter;

    #[test]
    fn token_id_spellings_are_normalized() {
        for body in [
            json!({"transaction_details": {"transactionHash": "0x1", "tokenID": "41"}}),
            json!({"transaction_details": {"transactionHash": "0x1", "tokenId": 41}}),
            json!({"transaction_details": {"transactionHash": "0x1", "token_id": "41"}}),
        ] {
            let receipt = normalize_mint_response(&body, "0xC").unwrap();
            assert_eq!(receipt.token_id(), &TokenId::Assigned("41".into()));
            assert_eq!(receipt.contract_address(), "0xC");
        }
    }

    #[test]
    fn missing_token_id_is_pending() {
        let body = json!({"transaction_details": {"transactionHash": "0x9", "tokenID": ""}});
        let receipt = normalize_mint_response(&body, "0xC").unwrap();
        assert!(receipt.token_id().is_pending());
        assert_eq!(receipt.transaction_hash(), Some("0x9"));

        assert!(normalize_mint_response(&json!({"status": "queued"}), "0xC").is_none());
    }

    async fn serve(reply: Value, status: warp::http::StatusCode) -> String {
        let route = warp::post()
            .and(warp::header::<String>("x-api-key"))
            .map(move |_key: String| warp::reply::with_status(warp::reply::json(&reply), status));
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        format!("http://{addr}")
    }

    fn mint_request(dir: &std::path::Path) -> MintRequest {
        let image = dir.join("ndvi.png");
        std::fs::write(&image, b"\x89PNG").unwrap();
        MintRequest {
            image,
            subject: CertificateSubject::Biomass(92.0),
            lat: -3.46,
            lng: -62.21,
            carbon_tonnes: Some(1200.0),
        }
    }

    #[tokio::test]
    async fn mint_against_live_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve(
            json!({"transaction_details": {"transactionHash": "0xfeed", "tokenId": 7}}),
            warp::http::StatusCode::OK,
        )
        .await;
        let ledger = VerbwireLedger::new(
            LedgerConfig::default().with_api_key("k").with_base_url(url).with_contract("0xC"),
        )
        .unwrap();

        let receipt = ledger.mint(&mint_request(dir.path())).await.unwrap().unwrap();
        assert_eq!(receipt.token_id().as_str(), "7");
        assert_eq!(receipt.transaction_hash(), Some("0xfeed"));
    }

    #[tokio::test]
    async fn rejected_update_is_none() {
        let url = serve(json!({"error": "token not indexed"}), warp::http::StatusCode::BAD_REQUEST).await;
        let ledger =
            VerbwireLedger::new(LedgerConfig::default().with_api_key("k").with_base_url(url)).unwrap();

        let result = ledger
            .update_status(&UpdateRequest {
                contract_address: "0xC".into(),
                token_id: "7".into(),
                status: CertificateStatus::Normal,
                carbon_tonnes: Some(10.0),
            })
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn mint_without_key_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = VerbwireLedger::new(LedgerConfig::default()).unwrap();
        let err = ledger.mint(&mint_request(dir.path())).await.unwrap_err();
        assert!(matches!(err, LedgerError::MissingCredentials));
    }
}
