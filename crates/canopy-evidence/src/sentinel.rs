//! Sentinel Hub imagery client
//!
//! OAuth client-credentials auth against the Copernicus identity realm, then
//! `POST /api/v1/process` with a per-layer evalscript. The token is cached in
//! a moka cache for `token_ttl` so back-to-back fetches inside one audit share
//! a single login.

use crate::error::EvidenceError;
use crate::provider::{AccessToken, ImageRequest, ImageryProvider};
use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

pub const DEFAULT_AUTH_URL: &str =
    "https://services.sentinel-hub.com/auth/realms/main/protocol/openid-connect/token";
pub const DEFAULT_PROCESS_URL: &str = "https://services.sentinel-hub.com/api/v1/process";

const CRS84: &str = "http://www.opengis.net/def/crs/OGC/1.3/CRS84";
const COLLECTION: &str = "sentinel-2-l2a";

/// Sentinel Hub connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub auth_url: String,
    pub process_url: String,
    /// Token reuse window; keep below the provider's token lifetime
    pub token_ttl_secs: u64,
    pub max_cloud_coverage: u8,
    pub image_size: u32,
    pub timeout_secs: u64,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            auth_url: DEFAULT_AUTH_URL.to_string(),
            process_url: DEFAULT_PROCESS_URL.to_string(),
            token_ttl_secs: 3000,
            max_cloud_coverage: 20,
            image_size: 512,
            timeout_secs: 60,
        }
    }
}

impl SentinelConfig {
    #[inline]
    #[must_use]
    pub fn with_credentials(mut self, id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self.client_secret = Some(secret.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_endpoints(mut self, auth_url: impl Into<String>, process_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self.process_url = process_url.into();
        self
    }

    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// [`ImageryProvider`] backed by Sentinel Hub
#[derive(Debug, Clone)]
pub struct SentinelHubClient {
    http: reqwest::Client,
    config: SentinelConfig,
    token: Cache<(), AccessToken>,
}

impl SentinelHubClient {
    /// # Errors
    /// Returns [`EvidenceError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: SentinelConfig) -> Result<Self, EvidenceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let token = Cache::builder()
            .max_capacity(1)
            .time_to_live(Duration::from_secs(config.token_ttl_secs))
            .build();
        Ok(Self { http, config, token })
    }

    #[must_use]
    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    /// Drop the cached token so the next call logs in again
    pub async fn invalidate_token(&self) {
        self.token.invalidate(&()).await;
    }

    async fn login(&self) -> Result<AccessToken, EvidenceError> {
        let (Some(id), Some(secret)) = (&self.config.client_id, &self.config.client_secret) else {
            return Err(EvidenceError::Auth("sentinel client credentials not configured".into()));
        };

        let response = self
            .http
            .post(&self.config.auth_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", id.as_str()),
                ("client_secret", secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EvidenceError::Auth(format!("HTTP {status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| EvidenceError::Auth(format!("malformed token response: {e}")))?;
        tracing::debug!("sentinel token refreshed");
        Ok(AccessToken::new(token.access_token))
    }

    /// Request body for the process API
    #[must_use]
    pub fn process_body(&self, request: &ImageRequest) -> serde_json::Value {
        json!({
            "input": {
                "bounds": {
                    "bbox": request.bbox.to_array(),
                    "properties": { "crs": CRS84 }
                },
                "data": [{
                    "type": COLLECTION,
                    "dataFilter": {
                        "timeRange": {
                            "from": request.time_range.from.to_rfc3339(),
                            "to": request.time_range.to.to_rfc3339()
                        },
                        "maxCloudCoverage": self.config.max_cloud_coverage
                    }
                }]
            },
            "output": {
                "width": self.config.image_size,
                "height": self.config.image_size,
                "responses": [{ "identifier": "default", "format": { "type": "image/png" } }]
            },
            "evalscript": request.layer.evalscript()
        })
    }
}

#[async_trait]
impl ImageryProvider for SentinelHubClient {
    async fn authenticate(&self) -> Result<AccessToken, EvidenceError> {
        if let Some(token) = self.token.get(&()).await {
            return Ok(token);
        }
        let token = self.login().await?;
        self.token.insert((), token.clone()).await;
        Ok(token)
    }

    async fn fetch_image(
        &self,
        token: &AccessToken,
        request: &ImageRequest,
    ) -> Result<Vec<u8>, EvidenceError> {
        let response = self
            .http
            .post(&self.config.process_url)
            .bearer_auth(token.secret())
            .json(&self.process_body(request))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.invalidate_token().await;
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EvidenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(EvidenceError::EmptyRaster(request.layer.as_str()));
        }
        Ok(bytes.to_vec())
    }
}
