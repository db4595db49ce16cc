//! Parsed analysis results
//!
//! The engine prints a single JSON object. [`parse_output`] turns it into an
//! [`AnalysisResult`] while keeping the raw payload, which callers return
//! verbatim to clients.

use crate::error::AnalysisError;
use canopy_evidence::IndexLayer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Dryness above which the moisture engine calls a site `DANGER`
pub const DANGER_DRYNESS: f64 = 30.0;

/// What the engine was asked to judge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisKind {
    /// Biomass / deforestation verdict over NDVI rasters
    Audit,
    /// Dryness over an NDMI raster
    Guardian,
}

impl From<IndexLayer> for AnalysisKind {
    fn from(layer: IndexLayer) -> Self {
        match layer {
            IndexLayer::Vegetation => Self::Audit,
            IndexLayer::Moisture => Self::Guardian,
        }
    }
}

/// Verdict string reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AnalysisStatus {
    Verified,
    /// Any `REJECTED*` status; holds the full status string
    Rejected(String),
    /// Anything else (`DANGER`, `SAFE`, ...)
    Other(String),
}

impl AnalysisStatus {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "VERIFIED" => Self::Verified,
            s if s.starts_with("REJECTED") => Self::Rejected(s.to_string()),
            s => Self::Other(s.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Verified => "VERIFIED",
            Self::Rejected(s) | Self::Other(s) => s,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AnalysisStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AnalysisStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

/// Land-cover split in percent; not checked to sum to 100
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    #[serde(default)]
    pub dense: f64,
    #[serde(default)]
    pub sparse: f64,
    #[serde(default)]
    pub barren: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditFindings {
    pub biomass_score: Option<f64>,
    pub carbon_tonnes: Option<f64>,
    pub deforestation_percent: f64,
    pub encroachment_risk: Option<f64>,
    pub detected_features: Vec<String>,
    pub composition: Option<Composition>,
    pub probable_cause: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoistureFindings {
    pub dryness_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Findings {
    Audit(AuditFindings),
    Moisture(MoistureFindings),
}

/// Scores a verified audit is certified with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Certifiable {
    pub biomass_score: f64,
    pub carbon_tonnes: f64,
}

/// Engine output, typed, plus the untouched payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub kind: AnalysisKind,
    pub status: AnalysisStatus,
    pub findings: Findings,
    pub raw: Value,
}

impl AnalysisResult {
    #[must_use]
    pub fn audit(&self) -> Option<&AuditFindings> {
        match &self.findings {
            Findings::Audit(f) => Some(f),
            Findings::Moisture(_) => None,
        }
    }

    #[must_use]
    pub fn dryness_score(&self) -> Option<f64> {
        match &self.findings {
            Findings::Moisture(m) => Some(m.dryness_score),
            Findings::Audit(_) => None,
        }
    }

    /// `Some` only for a VERIFIED audit, which always carries both scores
    #[must_use]
    pub fn certifiable(&self) -> Option<Certifiable> {
        if !self.status.is_verified() {
            return None;
        }
        let audit = self.audit()?;
        Some(Certifiable {
            biomass_score: audit.biomass_score?,
            carbon_tonnes: audit.carbon_tonnes?,
        })
    }
}

/// Parse engine stdout for the given kind
///
/// The whole output is tried first; if that fails the last non-empty line is
/// tried, since engines sometimes print progress lines before the result.
///
/// # Errors
/// See [`AnalysisError`]; every output-shape problem maps to one variant.
pub fn parse_output(kind: AnalysisKind, stdout: &str) -> Result<AnalysisResult, AnalysisError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(AnalysisError::Empty);
    }

    let raw: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(whole) => trimmed
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .and_then(|l| serde_json::from_str(l).ok())
            .ok_or_else(|| AnalysisError::Malformed(whole.to_string()))?,
    };

    let Value::Object(obj) = &raw else {
        return Err(AnalysisError::Malformed(format!("expected a JSON object, got {raw}")));
    };

    if let Some(err) = obj.get("error") {
        let msg = err.as_str().map_or_else(|| err.to_string(), str::to_string);
        return Err(AnalysisError::Reported(msg));
    }

    let (status, findings) = match kind {
        AnalysisKind::Audit => parse_audit(obj)?,
        AnalysisKind::Guardian => parse_moisture(obj)?,
    };

    Ok(AnalysisResult {
        kind,
        status,
        findings,
        raw,
    })
}

fn number(obj: &Map<String, Value>, key: &'static str) -> Result<Option<f64>, AnalysisError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or(AnalysisError::MissingField(key)),
    }
}

fn parse_audit(obj: &Map<String, Value>) -> Result<(AnalysisStatus, Findings), AnalysisError> {
    let status = obj
        .get("status")
        .and_then(Value::as_str)
        .map(AnalysisStatus::parse)
        .ok_or(AnalysisError::MissingField("status"))?;

    let biomass_score = number(obj, "biomass_score")?;
    let carbon_tonnes = number(obj, "carbon_tonnes")?;
    if status.is_verified() {
        if biomass_score.is_none() {
            return Err(AnalysisError::MissingField("biomass_score"));
        }
        if carbon_tonnes.is_none() {
            return Err(AnalysisError::MissingField("carbon_tonnes"));
        }
    }

    let detected_features = obj
        .get("detected_features")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let composition = match obj.get("composition") {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            serde_json::from_value::<Composition>(v.clone())
                .map_err(|_| AnalysisError::MissingField("composition"))?,
        ),
    };

    let findings = AuditFindings {
        biomass_score,
        carbon_tonnes,
        deforestation_percent: number(obj, "deforestation_percent")?.unwrap_or(0.0),
        encroachment_risk: number(obj, "encroachment_risk")?,
        detected_features,
        composition,
        probable_cause: obj
            .get("probable_cause")
            .and_then(Value::as_str)
            .map(str::to_string),
    };
    Ok((status, Findings::Audit(findings)))
}

fn parse_moisture(obj: &Map<String, Value>) -> Result<(AnalysisStatus, Findings), AnalysisError> {
    let dryness_score =
        number(obj, "dryness_score")?.ok_or(AnalysisError::MissingField("dryness_score"))?;
    let status = obj
        .get("status")
        .and_then(Value::as_str)
        .map_or_else(
            || {
                AnalysisStatus::Other(
                    if dryness_score > DANGER_DRYNESS { "DANGER" } else { "SAFE" }.to_string(),
                )
            },
            AnalysisStatus::parse,
        );
    Ok((status, Findings::Moisture(MoistureFindings { dryness_score })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn verified_audit_is_certifiable() {
        let out = r#"{"biomass_score": 92, "carbon_tonnes": 1200, "deforestation_percent": 0.4, "probable_cause": "N/A", "status": "VERIFIED"}"#;
        let result = parse_output(AnalysisKind::Audit, out).unwrap();

        assert_eq!(result.status, AnalysisStatus::Verified);
        assert_eq!(
            result.certifiable(),
            Some(Certifiable {
                biomass_score: 92.0,
                carbon_tonnes: 1200.0
            })
        );
        assert_eq!(result.raw["biomass_score"], json!(92));
    }

    #[test]
    fn rejection_is_a_result_not_an_error() {
        let out = r#"{"biomass_score": 12.5, "carbon_tonnes": 90, "status": "REJECTED_LOW_BIOMASS"}"#;
        let result = parse_output(AnalysisKind::Audit, out).unwrap();

        assert_eq!(
            result.status,
            AnalysisStatus::Rejected("REJECTED_LOW_BIOMASS".into())
        );
        assert!(result.certifiable().is_none());
    }

    #[test]
    fn reported_error_is_an_error() {
        let err = parse_output(AnalysisKind::Audit, r#"{"error": "Missing image files"}"#).unwrap_err();
        assert!(matches!(err, AnalysisError::Reported(m) if m == "Missing image files"));
    }

    #[test]
    fn verified_without_scores_is_rejected_as_malformed() {
        let err = parse_output(AnalysisKind::Audit, r#"{"status": "VERIFIED", "biomass_score": 80}"#)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::MissingField("carbon_tonnes")));
    }

    #[test]
    fn garbage_and_empty_output() {
        assert!(matches!(parse_output(AnalysisKind::Audit, "  \n"), Err(AnalysisError::Empty)));
        assert!(matches!(
            parse_output(AnalysisKind::Audit, "Traceback (most recent call last)"),
            Err(AnalysisError::Malformed(_))
        ));
        assert!(matches!(
            parse_output(AnalysisKind::Audit, "[1, 2]"),
            Err(AnalysisError::Malformed(_))
        ));
    }

    #[test]
    fn progress_lines_before_result_are_tolerated() {
        let out = "loading model\n{\"dryness_score\": 45.0, \"status\": \"DANGER\"}\n";
        let result = parse_output(AnalysisKind::Guardian, out).unwrap();
        assert_eq!(result.dryness_score(), Some(45.0));
        assert_eq!(result.status.as_str(), "DANGER");
    }

    #[test]
    fn moisture_status_defaults_from_dryness() {
        let result = parse_output(AnalysisKind::Guardian, r#"{"dryness_score": 12}"#).unwrap();
        assert_eq!(result.status, AnalysisStatus::Other("SAFE".into()));

        let err = parse_output(AnalysisKind::Guardian, r#"{"status": "SAFE"}"#).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingField("dryness_score")));
    }

    #[test]
    fn rich_audit_fields_pass_through() {
        let out = json!({
            "status": "VERIFIED",
            "biomass_score": 71.3,
            "carbon_tonnes": 534,
            "encroachment_risk": 18,
            "detected_features": ["river", "road", "clearing"],
            "composition": {"dense": 60, "sparse": 30, "barren": 20}
        })
        .to_string();
        let result = parse_output(AnalysisKind::Audit, &out).unwrap();
        let audit = result.audit().unwrap();

        assert_eq!(audit.detected_features, vec!["river", "road", "clearing"]);
        assert_eq!(audit.encroachment_risk, Some(18.0));
        assert_eq!(
            audit.composition,
            Some(Composition {
                dense: 60.0,
                sparse: 30.0,
                barren: 20.0
            })
        );
        assert_eq!(audit.deforestation_percent, 0.0);
    }
}
