//! Core data model

use canopy_analyzer::{AuditFindings, Composition};
use canopy_evidence::ContentHash;
use canopy_ledger::TokenId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Contract address recorded when no certificate could be attributed
///
/// Reconciliation adopts the emitting contract for these records.
pub const UNKNOWN_CONTRACT: &str = "N/A";

/// Audit record identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AuditId(pub Ulid);

impl AuditId {
    /// Generate new audit ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for AuditId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AuditId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Watch-list entry identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WatchTargetId(pub Ulid);

impl WatchTargetId {
    /// Generate new target ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for WatchTargetId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WatchTargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for WatchTargetId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// Caller-supplied user identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Discrete fire-risk level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    #[default]
    Normal,
    Critical,
}

impl RiskLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Existing certificate named by a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRef {
    pub contract_address: String,
    pub token_id: String,
}

impl CertificateRef {
    /// Both halves present and non-blank
    #[must_use]
    pub fn from_parts(contract_address: Option<&str>, token_id: Option<&str>) -> Option<Self> {
        let contract = contract_address.map(str::trim).filter(|s| !s.is_empty())?;
        let token = token_id.map(str::trim).filter(|s| !s.is_empty())?;
        Some(Self {
            contract_address: contract.to_string(),
            token_id: token.to_string(),
        })
    }
}

/// Durable evidence image backing a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub file_name: String,
    pub hash: ContentHash,
}

/// Persisted certificate of a verified, committed audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: AuditId,
    pub user_id: UserId,
    pub lat: f64,
    pub lng: f64,
    pub biomass_score: f64,
    pub carbon_tonnes: f64,
    pub deforestation_risk: f64,
    pub encroachment_risk: Option<f64>,
    pub detected_features: Vec<String>,
    pub composition: Option<Composition>,
    pub image_ref: ImageRef,
    pub contract_address: String,
    pub token_id: TokenId,
    pub transaction_hash: Option<String>,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl AuditRecord {
    /// Overwrite the analysis-derived fields; identity and `timestamp` stay
    pub fn refresh(&mut self, findings: &AuditFindings, status: &str, now: DateTime<Utc>) {
        if let Some(score) = findings.biomass_score {
            self.biomass_score = score;
        }
        if let Some(carbon) = findings.carbon_tonnes {
            self.carbon_tonnes = carbon;
        }
        self.deforestation_risk = findings.deforestation_percent;
        self.encroachment_risk = findings.encroachment_risk;
        self.detected_features.clone_from(&findings.detected_features);
        self.composition = findings.composition;
        self.status = status.to_string();
        self.updated_at = Some(now);
    }
}

/// A monitored location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchTarget {
    pub id: WatchTargetId,
    pub user_id: UserId,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub last_status: RiskLevel,
    pub last_checked: Option<DateTime<Utc>>,
}

impl WatchTarget {
    #[must_use]
    pub fn new(user_id: UserId, name: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            id: WatchTargetId::new(),
            user_id,
            name: name.into(),
            lat,
            lng,
            last_status: RiskLevel::Normal,
            last_checked: None,
        }
    }
}

/// Per-user alert preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub user_id: UserId,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default = "enabled")]
    pub notifications_enabled: bool,
}

fn enabled() -> bool {
    true
}

impl UserSettings {
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            phone_number: None,
            notifications_enabled: true,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = Some(phone.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certificate_ref_needs_both_parts() {
        assert!(CertificateRef::from_parts(Some("0xC"), Some("12")).is_some());
        assert!(CertificateRef::from_parts(Some("0xC"), None).is_none());
        assert!(CertificateRef::from_parts(Some("  "), Some("12")).is_none());
    }

    #[test]
    fn records_serialize_camel_case() {
        let target = WatchTarget::new("u1".into(), "Ridge", 34.0, -118.0);
        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(json["lastStatus"], "NORMAL");
        assert_eq!(json["userId"], "u1");
    }

    #[test]
    fn settings_default_to_notifications_on() {
        let settings: UserSettings = serde_json::from_str(r#"{"userId": "u1"}"#).unwrap();
        assert!(settings.notifications_enabled);
        assert_eq!(settings.phone_number, None);
    }
}
