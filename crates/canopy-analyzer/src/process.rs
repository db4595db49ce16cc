//! Out-of-process analysis engine

use crate::error::AnalysisError;
use crate::result::{parse_output, AnalysisKind, AnalysisResult};
use crate::Analyzer;
use async_trait::async_trait;
use canopy_evidence::EvidenceSet;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// How to launch the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessAnalyzerConfig {
    /// Interpreter or binary, e.g. `python3`
    pub program: String,
    /// Script receiving `<current> <historical>` index paths
    pub audit_script: PathBuf,
    /// Script receiving `<moisture>` index path
    pub moisture_script: PathBuf,
    /// Kill the engine after this many seconds; unset waits forever
    pub timeout_secs: Option<u64>,
}

impl Default for ProcessAnalyzerConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            audit_script: PathBuf::from("scripts/analyze_advanced.py"),
            moisture_script: PathBuf::from("scripts/moisture.py"),
            timeout_secs: None,
        }
    }
}

impl ProcessAnalyzerConfig {
    #[inline]
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

/// [`Analyzer`] that runs `<program> <script> <paths...>` and parses stdout
#[derive(Debug, Clone)]
pub struct ProcessAnalyzer {
    config: ProcessAnalyzerConfig,
}

impl ProcessAnalyzer {
    #[must_use]
    pub fn new(config: ProcessAnalyzerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ProcessAnalyzerConfig {
        &self.config
    }

    fn command(&self, kind: AnalysisKind, evidence: &EvidenceSet) -> Command {
        let script = match kind {
            AnalysisKind::Audit => &self.config.audit_script,
            AnalysisKind::Guardian => &self.config.moisture_script,
        };
        let mut cmd = Command::new(&self.config.program);
        cmd.arg(script)
            .args(evidence.index_paths())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Analyzer for ProcessAnalyzer {
    async fn run(&self, evidence: &EvidenceSet) -> Result<AnalysisResult, AnalysisError> {
        let kind = AnalysisKind::from(evidence.layer);
        let child = self
            .command(kind, evidence)
            .spawn()
            .map_err(|source| AnalysisError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        tracing::debug!(request_id = %evidence.request_id, ?kind, "analysis engine started");

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match self.config.timeout_secs.map(Duration::from_secs) {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| AnalysisError::Timeout(limit))??,
            None => child.wait_with_output().await?,
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(AnalysisError::ExitStatus {
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        if !stderr.trim().is_empty() {
            tracing::warn!(request_id = %evidence.request_id, stderr = %stderr.trim(), "analysis engine diagnostics");
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let result = parse_output(kind, &stdout)?;
        tracing::info!(request_id = %evidence.request_id, status = %result.status, "analysis complete");
        Ok(result)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use canopy_evidence::{
        ArtifactStore, BoundingBox, Coordinates, ContentHash, ArtifactHandle, ArtifactSlot,
        IndexLayer, RequestId,
    };
    use std::path::Path;

    fn evidence(dir: &Path, layer: IndexLayer) -> EvidenceSet {
        let location = Coordinates::new(-3.46, -62.21).unwrap();
        let request_id = RequestId::new();
        let store = ArtifactStore::new(dir);
        let handle = |slot: ArtifactSlot| ArtifactHandle {
            request_id,
            slot,
            path: store.path_of(request_id, slot),
            hash: ContentHash::compute(b""),
            size: 0,
        };
        let (current, historical) = match layer {
            IndexLayer::Vegetation => (handle(ArtifactSlot::NdviCurrent), Some(handle(ArtifactSlot::NdviHistorical))),
            IndexLayer::Moisture => (handle(ArtifactSlot::NdmiCurrent), None),
        };
        EvidenceSet {
            request_id,
            layer,
            location,
            bbox: BoundingBox::around(location, 0.01),
            current_index: current,
            historical_index: historical,
            current_true_color: None,
            historical_true_color: None,
        }
    }

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn sh(dir: &Path, audit: &str, moisture: &str) -> ProcessAnalyzer {
        ProcessAnalyzer::new(ProcessAnalyzerConfig {
            program: "sh".into(),
            audit_script: script(dir, "audit.sh", audit),
            moisture_script: script(dir, "moisture.sh", moisture),
            timeout_secs: None,
        })
    }

    #[tokio::test]
    async fn audit_script_receives_both_index_paths() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = sh(
            dir.path(),
            r#"echo "{\"status\":\"VERIFIED\",\"biomass_score\":92,\"carbon_tonnes\":1200,\"argc\":$#}""#,
            "exit 1",
        );

        let result = analyzer.run(&evidence(dir.path(), IndexLayer::Vegetation)).await.unwrap();

        assert!(result.status.is_verified());
        assert_eq!(result.raw["argc"], 2);
    }

    #[tokio::test]
    async fn stderr_alone_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = sh(
            dir.path(),
            "exit 1",
            r#"echo "warning: low light" >&2; echo '{"dryness_score": 55.5, "status": "DANGER"}'"#,
        );

        let result = analyzer.run(&evidence(dir.path(), IndexLayer::Moisture)).await.unwrap();
        assert_eq!(result.kind, AnalysisKind::Guardian);
        assert_eq!(result.dryness_score(), Some(55.5));
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = sh(dir.path(), "echo boom >&2; exit 3", "exit 0");

        let err = analyzer.run(&evidence(dir.path(), IndexLayer::Vegetation)).await.unwrap_err();
        assert!(matches!(err, AnalysisError::ExitStatus { code: Some(3), ref stderr } if stderr == "boom"));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = ProcessAnalyzer::new(
            ProcessAnalyzerConfig::default().with_program("/nonexistent/canopy-engine"),
        );

        let err = analyzer.run(&evidence(dir.path(), IndexLayer::Moisture)).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Spawn { .. }));
    }

    #[tokio::test]
    async fn hung_engine_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut analyzer = sh(dir.path(), "sleep 10", "sleep 10");
        analyzer.config.timeout_secs = Some(1);

        let err = analyzer.run(&evidence(dir.path(), IndexLayer::Moisture)).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Timeout(d) if d.as_secs() == 1));
    }
}
