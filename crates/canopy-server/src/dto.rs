//! Request and response bodies
//!
//! Requests use the dashboard's camelCase field names. Responses keep the
//! snake_case keys existing clients read.

use canopy_core::{
    ActionTaken, AuditMode, AuditRequest, BatchSummary, CanopyError, CertificateRef,
    CertificationOutcome, PredictOutcome, PredictRequest, RiskAssessment, TargetFailure,
    TargetResult, UserId, WorkflowStage,
};
use canopy_evidence::{BoundingBox, Coordinates, RequestId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Numbers sometimes arrive as strings from form inputs
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Text(String),
}

impl Scalar {
    fn as_f64(&self, field: &str) -> Result<f64, CanopyError> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| CanopyError::InvalidRequest(format!("{field} must be a number"))),
        }
    }

    /// Token ids may be sent as JSON numbers
    fn into_text(self) -> String {
        match self {
            Self::Number(n) if n.fract() == 0.0 && n >= 0.0 => format!("{n:.0}"),
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

fn location(lat: Option<&Scalar>, lng: Option<&Scalar>) -> Result<Coordinates, CanopyError> {
    let (Some(lat), Some(lng)) = (lat, lng) else {
        return Err(CanopyError::InvalidRequest("lat and lng are required".into()));
    };
    Ok(Coordinates::new(lat.as_f64("lat")?, lng.as_f64("lng")?)?)
}

fn user(user_id: Option<String>) -> Option<UserId> {
    user_id
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .map(UserId::from)
}

fn certificate(contract_address: Option<String>, token_id: Option<Scalar>) -> Option<CertificateRef> {
    let token_id = token_id.map(Scalar::into_text);
    CertificateRef::from_parts(contract_address.as_deref(), token_id.as_deref())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeBody {
    pub lat: Option<Scalar>,
    pub lng: Option<Scalar>,
    pub user_id: Option<String>,
    pub mode: Option<String>,
    pub token_id: Option<Scalar>,
    pub contract_address: Option<String>,
    pub bbox: Option<[f64; 4]>,
}

impl AnalyzeBody {
    /// # Errors
    /// [`CanopyError::InvalidRequest`] or [`CanopyError::InvalidLocation`].
    pub fn into_request(self) -> Result<AuditRequest, CanopyError> {
        let user_id = user(self.user_id).ok_or_else(|| CanopyError::InvalidRequest("userId is required".into()))?;
        let location = location(self.lat.as_ref(), self.lng.as_ref())?;

        let mut request = AuditRequest::new(user_id, location);
        if self
            .mode
            .as_deref()
            .is_some_and(|m| m.trim().eq_ignore_ascii_case("SIMULATION"))
        {
            request = request.with_mode(AuditMode::Simulation);
        }
        if let Some(certificate) = certificate(self.contract_address, self.token_id) {
            request = request.with_certificate(certificate);
        }
        if let Some(corners) = self.bbox {
            request = request.with_bbox(BoundingBox::from_corners(corners)?);
        }
        Ok(request)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub request_id: RequestId,
    pub ai_data: Value,
    pub blockchain_data: Option<Value>,
    pub action_taken: ActionTaken,
    pub is_simulation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_image: Option<String>,
    pub stages: Vec<WorkflowStage>,
}

impl From<CertificationOutcome> for AnalyzeResponse {
    fn from(outcome: CertificationOutcome) -> Self {
        Self {
            success: true,
            request_id: outcome.request_id,
            ai_data: outcome.analysis.raw,
            blockchain_data: outcome.blockchain_data,
            action_taken: outcome.intent.action_taken,
            is_simulation: outcome.intent.is_simulation,
            audit_id: outcome.record.map(|r| r.id.to_string()),
            evidence_image: outcome.evidence_image,
            stages: outcome.trail.stages().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictBody {
    pub lat: Option<Scalar>,
    pub lng: Option<Scalar>,
    pub user_id: Option<String>,
    pub token_id: Option<Scalar>,
    pub contract_address: Option<String>,
}

impl PredictBody {
    /// # Errors
    /// Missing or out-of-range coordinates.
    pub fn into_request(self) -> Result<PredictRequest, CanopyError> {
        Ok(PredictRequest {
            location: location(self.lat.as_ref(), self.lng.as_ref())?,
            user_id: user(self.user_id),
            certificate: certificate(self.contract_address, self.token_id),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictActions {
    pub sms_sent: bool,
    pub nft_updated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictResponse {
    pub success: bool,
    pub risk_data: RiskAssessment,
    pub actions: PredictActions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blockchain_data: Option<Value>,
}

impl From<PredictOutcome> for PredictResponse {
    fn from(outcome: PredictOutcome) -> Self {
        Self {
            success: true,
            risk_data: outcome.risk,
            actions: PredictActions {
                sms_sent: outcome.sms_sent,
                nft_updated: outcome.certificate_updated,
            },
            blockchain_data: outcome.blockchain_data,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanBody {
    pub user_id: Option<String>,
}

impl ScanBody {
    /// # Errors
    /// [`CanopyError::InvalidRequest`] without a user.
    pub fn user(self) -> Result<UserId, CanopyError> {
        user(self.user_id).ok_or_else(|| CanopyError::InvalidRequest("userId is required".into()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanResponse {
    pub success: bool,
    pub scanned: usize,
    pub alerts_sent: usize,
    pub results: Vec<TargetResult>,
    pub failures: Vec<TargetFailure>,
}

impl From<BatchSummary> for ScanResponse {
    fn from(summary: BatchSummary) -> Self {
        Self {
            success: true,
            scanned: summary.scanned,
            alerts_sent: summary.alerts_sent,
            results: summary.results,
            failures: summary.failures,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBody {
    pub transaction_hash: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchBody {
    pub user_id: Option<String>,
    pub name: Option<String>,
    pub lat: Option<Scalar>,
    pub lng: Option<Scalar>,
}

impl WatchBody {
    /// # Errors
    /// Missing user, name or coordinates.
    pub fn into_parts(self) -> Result<(UserId, String, Coordinates), CanopyError> {
        let user_id = user(self.user_id).ok_or_else(|| CanopyError::InvalidRequest("userId is required".into()))?;
        let name = self
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CanopyError::InvalidRequest("name is required".into()))?;
        Ok((user_id, name, location(self.lat.as_ref(), self.lng.as_ref())?))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsBody {
    pub phone_number: Option<String>,
    pub notifications_enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// JSON error body
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}
