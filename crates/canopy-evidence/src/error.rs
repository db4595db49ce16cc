//! Error types for evidence collection

/// Coordinate / bounding-box validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeoError {
    /// Latitude outside [-90, 90] or not finite
    #[error("latitude out of range: {0}")]
    Latitude(f64),

    /// Longitude outside [-180, 180] or not finite
    #[error("longitude out of range: {0}")]
    Longitude(f64),

    /// Bounding box corners are inverted or degenerate
    #[error("invalid bounding box: {0}")]
    BoundingBox(String),
}

/// Evidence collection failures
///
/// Any of these aborts the collection for the current request; no partial
/// evidence set is ever returned.
#[derive(Debug, thiserror::Error)]
pub enum EvidenceError {
    /// Imagery provider credentials missing or rejected
    #[error("imagery authentication failed: {0}")]
    Auth(String),

    /// Provider answered with a non-success status
    #[error("imagery provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Network-level failure talking to the provider
    #[error("imagery transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Provider returned an empty raster
    #[error("imagery provider returned an empty {0} raster")]
    EmptyRaster(&'static str),

    /// Artifact store I/O failure
    #[error("artifact store error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested artifact does not exist
    #[error("artifact not found: {0}")]
    NotFound(String),

    /// Invalid coordinates or bounding box
    #[error(transparent)]
    Geo(#[from] GeoError),
}

impl EvidenceError {
    /// Whether the failure came from bad caller input rather than the provider
    #[inline]
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::Geo(_))
    }
}
