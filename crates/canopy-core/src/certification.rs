//! Certification workflow
//!
//! collect -> analyze -> decide -> {skip | update | mint} -> persist.
//! Ledger calls always resolve before anything is written to the audit store,
//! so a failed request never leaves a partial record behind.

use crate::error::CanopyError;
use crate::stage::{StageTrail, WorkflowStage};
use crate::store::AuditStore;
use crate::types::{AuditId, AuditRecord, CertificateRef, ImageRef, UserId, UNKNOWN_CONTRACT};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use canopy_analyzer::{AnalysisResult, Analyzer, Certifiable};
use canopy_evidence::{ArtifactSlot, BoundingBox, Coordinates, EvidenceCollector, EvidenceSet, RequestId};
use canopy_ledger::{
    CertificateLedger, CertificateStatus, CertificateSubject, MintReceipt, MintRequest, TokenId,
    UpdateRequest,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;

/// Whether a run may touch the ledger and the audit store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditMode {
    /// Report results with no ledger or persistence side effects
    Simulation,
    /// Certify a verified parcel: update an existing token or mint one
    #[default]
    Mint,
}

/// One parcel to audit
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRequest {
    /// Owner of the resulting record
    pub user_id: UserId,
    /// Parcel centre
    pub location: Coordinates,
    pub mode: AuditMode,
    /// Certificate to update instead of minting
    pub certificate: Option<CertificateRef>,
    /// Imagery extent; defaults to a square around `location`
    pub bbox: Option<BoundingBox>,
}

impl AuditRequest {
    #[must_use]
    pub fn new(user_id: UserId, location: Coordinates) -> Self {
        Self {
            user_id,
            location,
            mode: AuditMode::Mint,
            certificate: None,
            bbox: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: AuditMode) -> Self {
        self.mode = mode;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_certificate(mut self, certificate: CertificateRef) -> Self {
        self.certificate = Some(certificate);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }
}

/// Ledger effect of a run, as reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionTaken {
    /// Simulation, rejected verdict, or nothing certifiable
    #[default]
    None,
    /// Existing certificate updated in place
    Updated,
    /// First certificate for the parcel
    MintedNew,
    /// Update failed or was declined, so a new token was minted
    MintedFallback,
}

/// Decision state of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CertificationIntent {
    pub is_simulation: bool,
    /// The request named a certificate to update
    pub has_existing_token: bool,
    pub action_taken: ActionTaken,
}

/// What DECIDING chose
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// No ledger call
    Skip,
    /// Update first, mint on failure
    Update {
        certificate: CertificateRef,
        scores: Certifiable,
    },
    Mint {
        scores: Certifiable,
    },
}

/// Pure DECIDING rule
#[must_use]
pub fn decide(analysis: &AnalysisResult, is_simulation: bool, certificate: Option<&CertificateRef>) -> Decision {
    if is_simulation {
        return Decision::Skip;
    }
    let Some(scores) = analysis.certifiable() else {
        return Decision::Skip;
    };
    match certificate {
        Some(certificate) => Decision::Update {
            certificate: certificate.clone(),
            scores,
        },
        None => Decision::Mint { scores },
    }
}

/// Everything one run produced
#[derive(Debug, Clone, PartialEq)]
pub struct CertificationOutcome {
    /// Key of this run's evidence in the artifact store
    pub request_id: RequestId,
    pub analysis: AnalysisResult,
    /// Mint receipt or update response, whichever ran
    pub blockchain_data: Option<Value>,
    pub intent: CertificationIntent,
    pub record: Option<AuditRecord>,
    /// `data:image/png;base64,...` of the certified raster
    pub evidence_image: Option<String>,
    pub trail: StageTrail,
}

/// Drives one audit from evidence to certificate
#[derive(Clone)]
pub struct CertificationWorkflow {
    collector: EvidenceCollector,
    analyzer: Arc<dyn Analyzer>,
    ledger: Arc<dyn CertificateLedger>,
    audits: Arc<dyn AuditStore>,
    /// Newest request directories kept after a run; `None` discards each
    /// run's artifacts
    retain_requests: Option<usize>,
}

impl std::fmt::Debug for CertificationWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificationWorkflow")
            .field("collector", &self.collector)
            .field("retain_requests", &self.retain_requests)
            .finish_non_exhaustive()
    }
}

impl CertificationWorkflow {
    #[must_use]
    pub fn new(
        collector: EvidenceCollector,
        analyzer: Arc<dyn Analyzer>,
        ledger: Arc<dyn CertificateLedger>,
        audits: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            collector,
            analyzer,
            ledger,
            audits,
            retain_requests: None,
        }
    }

    /// Keep the newest `max` requests' artifacts instead of discarding them
    #[inline]
    #[must_use]
    pub fn with_retained_requests(mut self, max: usize) -> Self {
        self.retain_requests = Some(max);
        self
    }

    /// Run the workflow for one request
    ///
    /// # Errors
    /// Evidence, analysis, mint and persistence failures abort the run. A
    /// failed or declined certificate update does not; it falls back to mint.
    pub async fn run(&self, request: AuditRequest) -> Result<CertificationOutcome, CanopyError> {
        let span = tracing::info_span!(
            "certify",
            user = %request.user_id,
            lat = request.location.lat,
            lng = request.location.lng,
            request_id = tracing::field::Empty,
        );
        async {
            let mut trail = StageTrail::new();
            let result = self.execute(&request, &mut trail).await;
            if let Err(e) = &result {
                trail.fail();
                tracing::error!(stages = ?trail.stages(), error = %e, "certification failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        request: &AuditRequest,
        trail: &mut StageTrail,
    ) -> Result<CertificationOutcome, CanopyError> {
        let evidence = self.collector.collect_audit(request.location, request.bbox).await?;
        tracing::Span::current().record("request_id", tracing::field::display(evidence.request_id));

        let outcome = self.certify(request, &evidence, trail).await;
        let cleanup = match self.retain_requests {
            Some(keep) => self.collector.prune(keep).await.map(drop),
            None => self.collector.discard(&evidence).await,
        };
        if let Err(e) = cleanup {
            tracing::warn!(error = %e, "failed to clean up evidence");
        }
        outcome
    }

    async fn certify(
        &self,
        request: &AuditRequest,
        evidence: &EvidenceSet,
        trail: &mut StageTrail,
    ) -> Result<CertificationOutcome, CanopyError> {
        trail.advance(WorkflowStage::Analyzing)?;
        let analysis = self.analyzer.run(evidence).await?;
        trail.advance(WorkflowStage::Deciding)?;

        let mut intent = CertificationIntent {
            is_simulation: request.mode == AuditMode::Simulation,
            has_existing_token: request.certificate.is_some(),
            action_taken: ActionTaken::None,
        };
        let mut outcome = CertificationOutcome {
            request_id: evidence.request_id,
            analysis: analysis.clone(),
            blockchain_data: None,
            intent,
            record: None,
            evidence_image: None,
            trail: trail.clone(),
        };

        let scores = match decide(&analysis, intent.is_simulation, request.certificate.as_ref()) {
            Decision::Skip => {
                trail.advance(WorkflowStage::Skipped)?;
                tracing::info!(status = %analysis.status, simulation = intent.is_simulation, "no certification action");
                outcome.trail = trail.clone();
                return Ok(outcome);
            }
            Decision::Update { certificate, scores } => {
                trail.advance(WorkflowStage::Updating)?;
                if let Some(response) = self.try_update(&certificate, scores).await {
                    trail.advance(WorkflowStage::Updated)?;
                    self.refresh_record(&certificate, &analysis).await?;
                    trail.advance(WorkflowStage::Done)?;

                    intent.action_taken = ActionTaken::Updated;
                    outcome.intent = intent;
                    outcome.blockchain_data = Some(response);
                    outcome.trail = trail.clone();
                    return Ok(outcome);
                }
                trail.advance(WorkflowStage::MintingFallback)?;
                intent.action_taken = ActionTaken::MintedFallback;
                scores
            }
            Decision::Mint { scores } => {
                trail.advance(WorkflowStage::Minting)?;
                intent.action_taken = ActionTaken::MintedNew;
                scores
            }
        };

        let receipt = self
            .ledger
            .mint(&MintRequest {
                image: evidence.current_index.path.clone(),
                subject: CertificateSubject::Biomass(scores.biomass_score),
                lat: request.location.lat,
                lng: request.location.lng,
                carbon_tonnes: Some(scores.carbon_tonnes),
            })
            .await?;
        if receipt.is_none() {
            tracing::warn!("ledger declined mint, recording certificate as pending");
        }
        trail.advance(WorkflowStage::Minted)?;

        trail.advance(WorkflowStage::Persisting)?;
        let (record, data_url) = self
            .persist(request, evidence, &analysis, scores, receipt.as_ref())
            .await?;
        trail.advance(WorkflowStage::Done)?;
        tracing::info!(audit_id = %record.id, token_id = %record.token_id, action = ?intent.action_taken, "audit certified");

        outcome.intent = intent;
        outcome.blockchain_data = receipt.as_ref().and_then(|r| serde_json::to_value(r).ok());
        outcome.record = Some(record);
        outcome.evidence_image = Some(data_url);
        outcome.trail = trail.clone();
        Ok(outcome)
    }

    /// `Some` only when the ledger accepted the update
    async fn try_update(&self, certificate: &CertificateRef, scores: Certifiable) -> Option<Value> {
        let request = UpdateRequest {
            contract_address: certificate.contract_address.clone(),
            token_id: certificate.token_id.clone(),
            status: CertificateStatus::Normal,
            carbon_tonnes: Some(scores.carbon_tonnes),
        };
        match self.ledger.update_status(&request).await {
            Ok(Some(response)) => Some(response),
            Ok(None) => {
                tracing::warn!(token_id = %certificate.token_id, "certificate update declined, minting fallback");
                None
            }
            Err(e) => {
                tracing::warn!(token_id = %certificate.token_id, error = %e, "certificate update failed, minting fallback");
                None
            }
        }
    }

    async fn refresh_record(&self, certificate: &CertificateRef, analysis: &AnalysisResult) -> Result<(), CanopyError> {
        let Some(findings) = analysis.audit() else {
            return Ok(());
        };
        let existing = self
            .audits
            .find_by_token(&certificate.contract_address, &certificate.token_id)
            .await?;
        match existing {
            Some(mut record) => {
                record.refresh(findings, analysis.status.as_str(), Utc::now());
                let id = record.id;
                self.audits.update(record).await?;
                tracing::info!(audit_id = %id, "audit record refreshed from update");
            }
            None => tracing::debug!(token_id = %certificate.token_id, "no local record for updated certificate"),
        }
        Ok(())
    }

    async fn persist(
        &self,
        request: &AuditRequest,
        evidence: &EvidenceSet,
        analysis: &AnalysisResult,
        scores: Certifiable,
        receipt: Option<&MintReceipt>,
    ) -> Result<(AuditRecord, String), CanopyError> {
        let id = AuditId::new();
        let store = self.collector.store();
        let durable = store.persist(&evidence.current_index, &id.to_string()).await?;
        let bytes = store.read(evidence.request_id, ArtifactSlot::NdviCurrent).await?;
        let data_url = format!("data:image/png;base64,{}", BASE64_STANDARD.encode(bytes));

        let (contract_address, token_id, transaction_hash) = match (receipt, &request.certificate) {
            (Some(r), _) => (
                r.contract_address().to_string(),
                r.token_id().clone(),
                r.transaction_hash().map(str::to_string),
            ),
            (None, Some(existing)) => (
                existing.contract_address.clone(),
                TokenId::from(existing.token_id.as_str()),
                None,
            ),
            (None, None) => (UNKNOWN_CONTRACT.to_string(), TokenId::Pending, None),
        };

        let findings = analysis.audit().cloned().unwrap_or_default();
        let record = AuditRecord {
            id,
            user_id: request.user_id.clone(),
            lat: request.location.lat,
            lng: request.location.lng,
            biomass_score: scores.biomass_score,
            carbon_tonnes: scores.carbon_tonnes,
            deforestation_risk: findings.deforestation_percent,
            encroachment_risk: findings.encroachment_risk,
            detected_features: findings.detected_features,
            composition: findings.composition,
            image_ref: ImageRef {
                file_name: durable.file_name,
                hash: durable.hash,
            },
            contract_address,
            token_id,
            transaction_hash,
            status: analysis.status.as_str().to_string(),
            timestamp: Utc::now(),
            updated_at: None,
        };

        if let Err(e) = self.audits.insert(record.clone()).await {
            tracing::error!(
                error = %e,
                contract = %record.contract_address,
                token_id = %record.token_id,
                tx = ?record.transaction_hash,
                "certificate issued but audit record was not saved"
            );
            return Err(e.into());
        }
        Ok((record, data_url))
    }
}
