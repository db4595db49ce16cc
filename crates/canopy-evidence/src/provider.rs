//! Imagery provider capability

use crate::error::EvidenceError;
use crate::geo::BoundingBox;
use crate::layer::{RasterLayer, TimeRange};
use async_trait::async_trait;

/// Short-lived bearer token issued by an imagery provider
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// One raster render request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageRequest {
    pub bbox: BoundingBox,
    pub layer: RasterLayer,
    pub time_range: TimeRange,
}

/// Source of satellite rasters
#[async_trait]
pub trait ImageryProvider: Send + Sync {
    /// Obtain a token valid for at least one subsequent fetch
    async fn authenticate(&self) -> Result<AccessToken, EvidenceError>;

    /// Render `request` and return encoded image bytes
    async fn fetch_image(
        &self,
        token: &AccessToken,
        request: &ImageRequest,
    ) -> Result<Vec<u8>, EvidenceError>;
}
