//! SMS alert dispatch
//!
//! Alerts only go out for CRITICAL risk. Send failures never propagate; they
//! are logged and reported as `false`.

use crate::store::SettingsStore;
use crate::types::{RiskLevel, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_TWILIO_URL: &str = "https://api.twilio.com/2010-04-01";

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("sms gateway not configured")]
    NotConfigured,

    #[error("sms transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("sms gateway returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    /// Operator-wide destination used when a user has no override
    pub default_destination: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            from_number: None,
            default_destination: None,
            base_url: DEFAULT_TWILIO_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

impl SmsConfig {
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.account_sid.is_some() && self.auth_token.is_some() && self.from_number.is_some()
    }
}

/// Twilio Messages API
#[derive(Debug, Clone)]
pub struct TwilioGateway {
    http: reqwest::Client,
    config: SmsConfig,
}

impl TwilioGateway {
    /// # Errors
    /// Returns [`NotifyError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: SmsConfig) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl SmsGateway for TwilioGateway {
    async fn send(&self, to: &str, body: &str) -> Result<(), NotifyError> {
        let (Some(sid), Some(token), Some(from)) = (
            self.config.account_sid.as_deref(),
            self.config.auth_token.as_deref(),
            self.config.from_number.as_deref(),
        ) else {
            return Err(NotifyError::NotConfigured);
        };

        let response = self
            .http
            .post(format!("{}/Accounts/{sid}/Messages.json", self.config.base_url))
            .basic_auth(sid, Some(token))
            .form(&[("To", to), ("From", from), ("Body", body)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

/// Alert message kinds
#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    /// On-demand check of one coordinate
    Site { location: String, wind_speed: f64 },
    /// Watch-list scan hit
    WatchTarget { name: String, dryness_score: f64 },
}

impl Alert {
    #[must_use]
    pub fn body(&self) -> String {
        match self {
            Self::Site {
                location,
                wind_speed,
            } => format!("ALERT: Critical Risk at {location}. Wind: {wind_speed}m/s. EVACUATE."),
            Self::WatchTarget {
                name,
                dryness_score,
            } => format!("AUTOMATED ALERT: {name} is at CRITICAL FIRE RISK. Dryness: {dryness_score}%."),
        }
    }
}

/// Resolved alert destination for a user (or the operator)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Phone(String),
    /// User turned alerts off
    Muted,
    /// No override and no default
    Nowhere,
}

/// Routes CRITICAL alerts to the right phone
#[derive(Clone)]
pub struct NotificationDispatcher {
    gateway: Option<Arc<dyn SmsGateway>>,
    settings: Arc<dyn SettingsStore>,
    default_destination: Option<String>,
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("gateway", &self.gateway.is_some())
            .field("default_destination", &self.default_destination)
            .finish_non_exhaustive()
    }
}

impl NotificationDispatcher {
    #[must_use]
    pub fn new(
        gateway: Option<Arc<dyn SmsGateway>>,
        settings: Arc<dyn SettingsStore>,
        default_destination: Option<String>,
    ) -> Self {
        Self {
            gateway,
            settings,
            default_destination,
        }
    }

    /// Per-user override first, operator default otherwise
    ///
    /// A failed settings lookup falls back to the default.
    pub async fn resolve_destination(&self, user: Option<&UserId>) -> Destination {
        if let Some(user) = user {
            match self.settings.get(user).await {
                Ok(Some(settings)) if !settings.notifications_enabled => return Destination::Muted,
                Ok(Some(settings)) => {
                    if let Some(phone) = settings.phone_number.filter(|p| !p.trim().is_empty()) {
                        return Destination::Phone(phone);
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(%user, error = %e, "settings lookup failed, using default destination"),
            }
        }
        self.default_destination
            .clone()
            .filter(|p| !p.trim().is_empty())
            .map_or(Destination::Nowhere, Destination::Phone)
    }

    /// Send `alert` to an already-resolved destination when `level` is CRITICAL
    pub async fn dispatch(&self, level: RiskLevel, destination: &Destination, alert: &Alert) -> bool {
        if level != RiskLevel::Critical {
            return false;
        }
        let Destination::Phone(phone) = destination else {
            tracing::info!(?destination, "critical alert not sent: no destination");
            return false;
        };
        let Some(gateway) = &self.gateway else {
            tracing::warn!("critical alert not sent: sms gateway not configured");
            return false;
        };
        match gateway.send(phone, &alert.body()).await {
            Ok(()) => {
                tracing::info!("critical alert sent");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "critical alert failed");
                false
            }
        }
    }

    /// Resolve for `user`, then dispatch
    pub async fn notify(&self, level: RiskLevel, user: Option<&UserId>, alert: &Alert) -> bool {
        if level != RiskLevel::Critical {
            return false;
        }
        let destination = self.resolve_destination(user).await;
        self.dispatch(level, &destination, alert).await
    }
}
