//! Top-level pipeline error
//!
//! Collaborator errors convert in with `#[from]`. The HTTP boundary only needs
//! [`CanopyError::is_client_error`] to pick between 400 and 500.

use crate::config::ConfigError;
use crate::stage::IllegalTransition;
use crate::store::StoreError;
use crate::weather::WeatherError;
use canopy_analyzer::AnalysisError;
use canopy_evidence::{EvidenceError, GeoError};
use canopy_ledger::LedgerError;

#[derive(Debug, thiserror::Error)]
pub enum CanopyError {
    /// Imagery could not be collected
    #[error("evidence collection failed: {0}")]
    Evidence(#[from] EvidenceError),

    /// Coordinates or bounding box out of range
    #[error("invalid location: {0}")]
    InvalidLocation(#[from] GeoError),

    /// Analysis engine failed (not a REJECTED verdict)
    #[error("analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    /// Mint or chain read failed
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("weather lookup failed: {0}")]
    Weather(#[from] WeatherError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),

    /// Malformed or incomplete request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    IllegalStage(#[from] IllegalTransition),
}

impl CanopyError {
    /// Caller's fault: report as 400
    #[inline]
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::InvalidLocation(_) | Self::InvalidRequest(_) => true,
            Self::Evidence(e) => e.is_invalid_input(),
            _ => false,
        }
    }

    /// A collaborator or local resource failed
    #[inline]
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Evidence(_)
                | Self::Analysis(_)
                | Self::Ledger(_)
                | Self::Weather(_)
                | Self::Persistence(_)
        ) && !self.is_client_error()
    }
}
