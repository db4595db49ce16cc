//! Canopy Evidence Collection
//!
//! Fetches satellite rasters for a coordinate from an imagery provider and
//! stores them as request-scoped, content-hashed artifacts.
//!
//! # Core Concepts
//!
//! - [`EvidenceCollector`]: audit (NDVI + true-color) and moisture (NDMI) collection
//! - [`ImageryProvider`]: provider capability; [`SentinelHubClient`] is the production one
//! - [`ArtifactStore`]: `<root>/requests/<request-id>/<slot>.png` layout with durable copies
//! - [`ContentHash`]: Blake3 fingerprint of every stored raster
//!
//! # Example
//!
//! ```rust,ignore
//! use canopy_evidence::{ArtifactStore, Coordinates, EvidenceCollector, SentinelConfig, SentinelHubClient};
//!
//! let provider = SentinelHubClient::new(SentinelConfig::default().with_credentials(id, secret))?;
//! let collector = EvidenceCollector::new(Arc::new(provider), ArtifactStore::new("data"));
//! let evidence = collector.collect_audit(Coordinates::new(-3.46, -62.21)?, None).await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod collector;
mod error;
mod geo;
mod hash;
mod layer;
mod provider;
mod sentinel;
mod store;

pub use collector::{EvidenceCollector, EvidenceSet, IndexLayer};
pub use error::{EvidenceError, GeoError};
pub use geo::{BoundingBox, Coordinates, DEFAULT_HALF_WIDTH_DEG};
pub use hash::{ContentHash, HashError};
pub use layer::{ArtifactSlot, RasterLayer, TimeRange, WINDOW_DAYS};
pub use provider::{AccessToken, ImageRequest, ImageryProvider};
pub use sentinel::{SentinelConfig, SentinelHubClient, DEFAULT_AUTH_URL, DEFAULT_PROCESS_URL};
pub use store::{ArtifactHandle, ArtifactStore, DurableImage, RequestId};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
