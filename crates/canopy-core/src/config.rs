//! Service configuration
//!
//! Load order: defaults, then an optional TOML file, then environment
//! overrides. Secrets normally come from the environment only.

use crate::notify::SmsConfig;
use crate::weather::WeatherConfig;
use canopy_analyzer::ProcessAnalyzerConfig;
use canopy_evidence::SentinelConfig;
use canopy_ledger::{ChainConfig, LedgerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_SENTINEL_CLIENT_ID: &str = "SENTINEL_CLIENT_ID";
pub const ENV_SENTINEL_CLIENT_SECRET: &str = "SENTINEL_CLIENT_SECRET";
pub const ENV_VERBWIRE_API_KEY: &str = "VERBWIRE_API_KEY";
pub const ENV_TWILIO_ACCOUNT_SID: &str = "TWILIO_ACCOUNT_SID";
pub const ENV_TWILIO_AUTH_TOKEN: &str = "TWILIO_AUTH_TOKEN";
pub const ENV_TWILIO_PHONE_NUMBER: &str = "TWILIO_PHONE_NUMBER";
pub const ENV_ALERT_DEFAULT_PHONE: &str = "ALERT_DEFAULT_PHONE";
/// Legacy name for [`ENV_ALERT_DEFAULT_PHONE`]
pub const ENV_MY_PHONE_NUMBER: &str = "MY_PHONE_NUMBER";
pub const ENV_OPENWEATHERMAP_API_KEY: &str = "OPENWEATHERMAP_API_KEY";
pub const ENV_CHAIN_RPC_URL: &str = "CHAIN_RPC_URL";
pub const ENV_ANALYZER_PYTHON: &str = "ANALYZER_PYTHON";
pub const ENV_PORT: &str = "PORT";

/// Configuration loading and validation failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing credentials: {}", .0.join(", "))]
    MissingCredentials(Vec<&'static str>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// HTTP listen address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

/// Evidence directory and retention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root for request-scoped and durable evidence
    pub evidence_dir: PathBuf,
    /// Keep audit request artifacts after the run completes; guardian
    /// evidence is always discarded
    pub retain_evidence: bool,
    /// Upper bound on retained audit requests, oldest pruned first
    pub max_retained_requests: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            evidence_dir: PathBuf::from("evidence"),
            retain_evidence: true,
            max_retained_requests: 500,
        }
    }
}

/// Full service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanopyConfig {
    pub server: ServerConfig,
    pub imagery: SentinelConfig,
    pub analyzer: ProcessAnalyzerConfig,
    pub ledger: LedgerConfig,
    pub chain: ChainConfig,
    pub sms: SmsConfig,
    pub weather: WeatherConfig,
    pub storage: StorageConfig,
}

impl CanopyConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.server.port = port;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_evidence_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage.evidence_dir = dir.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_retain_evidence(mut self, retain: bool) -> Self {
        self.storage.retain_evidence = retain;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_max_retained_requests(mut self, max: usize) -> Self {
        self.storage.max_retained_requests = max;
        self
    }

    /// # Errors
    /// [`ConfigError::Parse`] on malformed TOML or unknown value types.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Defaults, optional file, then process environment
    ///
    /// # Errors
    /// File read or parse failure, or an invalid structural value.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                tracing::debug!(path = %path.display(), "loaded config file");
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup`; blank values are ignored
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] when `PORT` is not a port number.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get(ENV_SENTINEL_CLIENT_ID) {
            self.imagery.client_id = Some(v);
        }
        if let Some(v) = get(ENV_SENTINEL_CLIENT_SECRET) {
            self.imagery.client_secret = Some(v);
        }
        if let Some(v) = get(ENV_VERBWIRE_API_KEY) {
            self.ledger.api_key = Some(v);
        }
        if let Some(v) = get(ENV_TWILIO_ACCOUNT_SID) {
            self.sms.account_sid = Some(v);
        }
        if let Some(v) = get(ENV_TWILIO_AUTH_TOKEN) {
            self.sms.auth_token = Some(v);
        }
        if let Some(v) = get(ENV_TWILIO_PHONE_NUMBER) {
            self.sms.from_number = Some(v);
        }
        if let Some(v) = get(ENV_ALERT_DEFAULT_PHONE).or_else(|| get(ENV_MY_PHONE_NUMBER)) {
            self.sms.default_destination = Some(v);
        }
        if let Some(v) = get(ENV_OPENWEATHERMAP_API_KEY) {
            self.weather.api_key = Some(v);
        }
        if let Some(v) = get(ENV_CHAIN_RPC_URL) {
            self.chain.rpc_url = v;
        }
        if let Some(v) = get(ENV_ANALYZER_PYTHON) {
            self.analyzer.program = v;
        }
        if let Some(v) = get(ENV_PORT) {
            self.server.port = v
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{ENV_PORT}={v} is not a port")))?;
        }
        Ok(())
    }

    /// Structural checks that hold regardless of credentials
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.analyzer.program.trim().is_empty() {
            return Err(ConfigError::Invalid("analyzer.program is empty".into()));
        }
        if self.imagery.image_size == 0 {
            return Err(ConfigError::Invalid("imagery.image_size must be positive".into()));
        }
        if self.imagery.max_cloud_coverage > 100 {
            return Err(ConfigError::Invalid("imagery.max_cloud_coverage is a percentage".into()));
        }
        if self.analyzer.timeout_secs == Some(0) {
            return Err(ConfigError::Invalid("analyzer.timeout_secs must be positive when set".into()));
        }
        if self.storage.retain_evidence && self.storage.max_retained_requests == 0 {
            return Err(ConfigError::Invalid(
                "storage.max_retained_requests must be positive when retaining evidence".into(),
            ));
        }
        Ok(())
    }

    /// Secrets every production collaborator needs
    ///
    /// SMS is optional as a whole, but a partial Twilio setup is rejected.
    ///
    /// # Errors
    /// [`ConfigError::MissingCredentials`] listing every absent variable.
    pub fn validate_credentials(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if self.imagery.client_id.is_none() {
            missing.push(ENV_SENTINEL_CLIENT_ID);
        }
        if self.imagery.client_secret.is_none() {
            missing.push(ENV_SENTINEL_CLIENT_SECRET);
        }
        if self.ledger.api_key.is_none() {
            missing.push(ENV_VERBWIRE_API_KEY);
        }
        if self.weather.api_key.is_none() {
            missing.push(ENV_OPENWEATHERMAP_API_KEY);
        }

        let sms = [
            (ENV_TWILIO_ACCOUNT_SID, self.sms.account_sid.is_some()),
            (ENV_TWILIO_AUTH_TOKEN, self.sms.auth_token.is_some()),
            (ENV_TWILIO_PHONE_NUMBER, self.sms.from_number.is_some()),
        ];
        if sms.iter().any(|(_, set)| *set) {
            missing.extend(sms.iter().filter(|(_, set)| !set).map(|(key, _)| *key));
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingCredentials(missing))
        }
    }
}
