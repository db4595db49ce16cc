//! Evidence collection for audit and guardian paths

use crate::error::EvidenceError;
use crate::geo::{BoundingBox, Coordinates, DEFAULT_HALF_WIDTH_DEG};
use crate::layer::{ArtifactSlot, TimeRange};
use crate::provider::{ImageRequest, ImageryProvider};
use crate::store::{ArtifactHandle, ArtifactStore, RequestId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Which index an evidence set was built around
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexLayer {
    /// NDVI current + historical, with true-color context
    Vegetation,
    /// Single current NDMI raster
    Moisture,
}

/// Raw rasters gathered for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSet {
    pub request_id: RequestId,
    pub layer: IndexLayer,
    pub location: Coordinates,
    pub bbox: BoundingBox,
    pub current_index: ArtifactHandle,
    pub historical_index: Option<ArtifactHandle>,
    pub current_true_color: Option<ArtifactHandle>,
    pub historical_true_color: Option<ArtifactHandle>,
}

impl EvidenceSet {
    /// Index rasters in the order an analysis engine expects them
    #[must_use]
    pub fn index_paths(&self) -> Vec<&Path> {
        std::iter::once(&self.current_index)
            .chain(self.historical_index.as_ref())
            .map(|h| h.path.as_path())
            .collect()
    }

    /// Every artifact in the set
    pub fn artifacts(&self) -> impl Iterator<Item = &ArtifactHandle> {
        std::iter::once(&self.current_index)
            .chain(self.historical_index.as_ref())
            .chain(self.current_true_color.as_ref())
            .chain(self.historical_true_color.as_ref())
    }
}

/// Fetches rasters from an [`ImageryProvider`] into an [`ArtifactStore`]
#[derive(Clone)]
pub struct EvidenceCollector {
    provider: Arc<dyn ImageryProvider>,
    store: ArtifactStore,
    half_width: f64,
}

impl std::fmt::Debug for EvidenceCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvidenceCollector")
            .field("store", &self.store)
            .field("half_width", &self.half_width)
            .finish_non_exhaustive()
    }
}

impl EvidenceCollector {
    #[must_use]
    pub fn new(provider: Arc<dyn ImageryProvider>, store: ArtifactStore) -> Self {
        Self {
            provider,
            store,
            half_width: DEFAULT_HALF_WIDTH_DEG,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_half_width(mut self, degrees: f64) -> Self {
        self.half_width = degrees;
        self
    }

    #[must_use]
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Vegetation evidence: NDVI now and a year ago, then both true-color
    /// rasters concurrently
    ///
    /// # Errors
    /// Any auth or fetch failure; artifacts already written are discarded.
    pub async fn collect_audit(
        &self,
        location: Coordinates,
        bbox: Option<BoundingBox>,
    ) -> Result<EvidenceSet, EvidenceError> {
        let request_id = RequestId::new();
        let bbox = bbox.unwrap_or_else(|| BoundingBox::around(location, self.half_width));
        tracing::info!(%request_id, lat = location.lat, lng = location.lng, "collecting audit evidence");

        let result = self.gather_audit(request_id, location, bbox).await;
        self.settle(request_id, result).await
    }

    /// Moisture evidence: one current NDMI raster around `location`
    ///
    /// # Errors
    /// Any auth or fetch failure.
    pub async fn collect_moisture(&self, location: Coordinates) -> Result<EvidenceSet, EvidenceError> {
        let request_id = RequestId::new();
        let bbox = BoundingBox::around(location, self.half_width);
        tracing::info!(%request_id, lat = location.lat, lng = location.lng, "collecting moisture evidence");

        let result = async {
            let current_index = self
                .fetch(request_id, ArtifactSlot::NdmiCurrent, bbox, TimeRange::current())
                .await?;
            Ok::<_, EvidenceError>(EvidenceSet {
                request_id,
                layer: IndexLayer::Moisture,
                location,
                bbox,
                current_index,
                historical_index: None,
                current_true_color: None,
                historical_true_color: None,
            })
        }
        .await;
        self.settle(request_id, result).await
    }

    /// Delete every transient artifact of `evidence`
    ///
    /// # Errors
    /// Returns [`EvidenceError::Io`] if removal fails.
    pub async fn discard(&self, evidence: &EvidenceSet) -> Result<(), EvidenceError> {
        self.store.discard(evidence.request_id).await
    }

    /// Keep only the newest `keep` requests' artifacts
    ///
    /// # Errors
    /// Returns [`EvidenceError::Io`] if listing or removal fails.
    pub async fn prune(&self, keep: usize) -> Result<usize, EvidenceError> {
        self.store.prune_requests(keep).await
    }

    async fn gather_audit(
        &self,
        request_id: RequestId,
        location: Coordinates,
        bbox: BoundingBox,
    ) -> Result<EvidenceSet, EvidenceError> {
        let now = Utc::now();
        let current = TimeRange::ending_at(now);
        let past = TimeRange::historical(now);

        let current_index = self
            .fetch(request_id, ArtifactSlot::NdviCurrent, bbox, current)
            .await?;
        let historical_index = self
            .fetch(request_id, ArtifactSlot::NdviHistorical, bbox, past)
            .await?;
        let (current_true_color, historical_true_color) = futures::try_join!(
            self.fetch(request_id, ArtifactSlot::TrueColorCurrent, bbox, current),
            self.fetch(request_id, ArtifactSlot::TrueColorHistorical, bbox, past),
        )?;

        Ok(EvidenceSet {
            request_id,
            layer: IndexLayer::Vegetation,
            location,
            bbox,
            current_index,
            historical_index: Some(historical_index),
            current_true_color: Some(current_true_color),
            historical_true_color: Some(historical_true_color),
        })
    }

    async fn fetch(
        &self,
        request_id: RequestId,
        slot: ArtifactSlot,
        bbox: BoundingBox,
        time_range: TimeRange,
    ) -> Result<ArtifactHandle, EvidenceError> {
        let token = self.provider.authenticate().await?;
        let request = ImageRequest {
            bbox,
            layer: slot.layer(),
            time_range,
        };
        let bytes = self.provider.fetch_image(&token, &request).await?;
        self.store.write(request_id, slot, &bytes).await
    }

    async fn settle(
        &self,
        request_id: RequestId,
        result: Result<EvidenceSet, EvidenceError>,
    ) -> Result<EvidenceSet, EvidenceError> {
        if let Err(e) = &result {
            tracing::warn!(%request_id, error = %e, "evidence collection failed");
            if let Err(cleanup) = self.store.discard(request_id).await {
                tracing::warn!(%request_id, error = %cleanup, "failed to discard partial evidence");
            }
        }
        result
    }
}
