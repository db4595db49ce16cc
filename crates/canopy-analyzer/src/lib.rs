//! Canopy Analyzer Gateway
//!
//! Turns an [`EvidenceSet`] into an [`AnalysisResult`]. The engine is opaque;
//! only its JSON output contract matters here.
//!
//! - [`Analyzer`]: the capability the pipeline depends on
//! - [`ProcessAnalyzer`]: runs an external script per evidence set
//! - [`parse_output`]: the output contract, usable by any implementation

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod process;
mod result;

pub use error::AnalysisError;
pub use process::{ProcessAnalyzer, ProcessAnalyzerConfig};
pub use result::{
    parse_output, AnalysisKind, AnalysisResult, AnalysisStatus, AuditFindings, Certifiable,
    Composition, Findings, MoistureFindings, DANGER_DRYNESS,
};

use async_trait::async_trait;
use canopy_evidence::EvidenceSet;

/// Judges one evidence set
///
/// The analysis kind follows from [`EvidenceSet::layer`]. Implementations make
/// exactly one attempt per call.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn run(&self, evidence: &EvidenceSet) -> Result<AnalysisResult, AnalysisError>;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
