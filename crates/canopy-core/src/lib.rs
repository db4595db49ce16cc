//! Canopy Core - Audit Pipeline Orchestrator
//!
//! Coordinates evidence collection, analysis and certification:
//! - Certification workflow with update-or-mint fallback
//! - Reconciliation of PENDING token ids from chain receipts
//! - Guardian fire-risk checks, alerts and watch-list scans
//! - Record stores, configuration and the top-level error
//!
//! # Example
//!
//! ```rust,ignore
//! use canopy_core::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let canopy = Canopy::from_config(CanopyConfig::load(None)?)?;
//!
//! let request = AuditRequest::new("user-1".into(), Coordinates::new(-3.46, -62.21)?);
//! let outcome = canopy.workflow().run(request).await?;
//!
//! println!("{:?} via {:?}", outcome.intent.action_taken, outcome.trail);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod certification;
pub mod config;
pub mod error;
pub mod guardian;
pub mod notify;
pub mod reconcile;
pub mod risk;
pub mod service;
pub mod stage;
pub mod store;
pub mod types;
pub mod weather;

pub use certification::{
    decide, ActionTaken, AuditMode, AuditRequest, CertificationIntent, CertificationOutcome,
    CertificationWorkflow, Decision,
};
pub use config::{CanopyConfig, ConfigError, ServerConfig, StorageConfig};
pub use error::CanopyError;
pub use guardian::{BatchSummary, Guardian, PredictOutcome, PredictRequest, TargetFailure, TargetResult};
pub use notify::{Alert, Destination, NotificationDispatcher, NotifyError, SmsConfig, SmsGateway, TwilioGateway};
pub use reconcile::{Reconciler, SyncOutcome};
pub use risk::{score, RiskAssessment};
pub use service::{Canopy, Collaborators, Stores};
pub use stage::{IllegalTransition, StageTrail, WorkflowStage};
pub use store::{
    AuditStore, InMemoryAuditStore, InMemorySettingsStore, InMemoryWatchlistStore, SettingsStore,
    StoreError, WatchlistStore,
};
pub use types::{
    AuditId, AuditRecord, CertificateRef, ImageRef, RiskLevel, UserId, UserSettings, WatchTarget,
    WatchTargetId, UNKNOWN_CONTRACT,
};
pub use weather::{OpenWeatherClient, WeatherConfig, WeatherError, WeatherProvider, WeatherReport};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the pipeline
    pub use crate::{
        ActionTaken, AuditMode, AuditRequest, Canopy, CanopyConfig, CanopyError, CertificateRef,
        CertificationOutcome, PredictRequest, RiskLevel, SyncOutcome, UserId,
    };
    pub use canopy_evidence::{BoundingBox, Coordinates};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
