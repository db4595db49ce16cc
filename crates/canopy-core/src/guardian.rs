//! Guardian: fire-risk checks for one site or a whole watch-list

use crate::error::CanopyError;
use crate::notify::{Alert, NotificationDispatcher};
use crate::risk::{self, RiskAssessment};
use crate::store::WatchlistStore;
use crate::types::{CertificateRef, RiskLevel, UserId, WatchTargetId};
use crate::weather::WeatherProvider;
use canopy_analyzer::{AnalysisError, Analyzer};
use canopy_evidence::{Coordinates, EvidenceCollector, EvidenceSet};
use canopy_ledger::{CertificateLedger, CertificateStatus, CertificateSubject, MintRequest, UpdateRequest};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;

/// One site to check
#[derive(Debug, Clone, PartialEq)]
pub struct PredictRequest {
    pub location: Coordinates,
    /// Whose alert settings apply; the default destination otherwise
    pub user_id: Option<UserId>,
    /// Certificate to flag CRITICAL
    pub certificate: Option<CertificateRef>,
}

/// Result of a single-site check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictOutcome {
    pub risk: RiskAssessment,
    pub sms_sent: bool,
    /// Update or fallback mint returned something
    pub certificate_updated: bool,
    pub blockchain_data: Option<Value>,
}

/// A watch target that was scanned
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetResult {
    pub id: WatchTargetId,
    pub name: String,
    pub status: RiskLevel,
}

/// A watch target skipped because its check failed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetFailure {
    pub id: WatchTargetId,
    pub name: String,
    pub error: String,
}

/// Totals of one watch-list scan
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    /// Targets that completed; failures are not counted
    pub scanned: usize,
    pub alerts_sent: usize,
    pub results: Vec<TargetResult>,
    pub failures: Vec<TargetFailure>,
}

/// Fire-risk checks and alerts
#[derive(Clone)]
pub struct Guardian {
    collector: EvidenceCollector,
    analyzer: Arc<dyn Analyzer>,
    weather: Arc<dyn WeatherProvider>,
    dispatcher: NotificationDispatcher,
    ledger: Arc<dyn CertificateLedger>,
    watchlist: Arc<dyn WatchlistStore>,
}

impl std::fmt::Debug for Guardian {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guardian")
            .field("collector", &self.collector)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl Guardian {
    #[must_use]
    pub fn new(
        collector: EvidenceCollector,
        analyzer: Arc<dyn Analyzer>,
        weather: Arc<dyn WeatherProvider>,
        dispatcher: NotificationDispatcher,
        ledger: Arc<dyn CertificateLedger>,
        watchlist: Arc<dyn WatchlistStore>,
    ) -> Self {
        Self {
            collector,
            analyzer,
            weather,
            dispatcher,
            ledger,
            watchlist,
        }
    }

    /// Weather, moisture evidence, dryness, score
    ///
    /// # Errors
    /// Weather, evidence or analysis failure.
    pub async fn assess(&self, location: Coordinates) -> Result<RiskAssessment, CanopyError> {
        let (assessment, evidence) = self.assess_keeping(location).await?;
        self.release(&evidence).await;
        Ok(assessment)
    }

    /// Single-site check with alerting and certificate status update
    ///
    /// # Errors
    /// Assessment failures only. Alert and ledger failures degrade to `false`.
    pub async fn predict(&self, request: PredictRequest) -> Result<PredictOutcome, CanopyError> {
        let span = tracing::info_span!("predict", lat = request.location.lat, lng = request.location.lng);
        async {
            let (risk, evidence) = self.assess_keeping(request.location).await?;
            tracing::info!(risk_score = risk.risk_score, level = ?risk.risk_level, "site assessed");

            let mut outcome = PredictOutcome {
                risk,
                sms_sent: false,
                certificate_updated: false,
                blockchain_data: None,
            };
            if outcome.risk.risk_level == RiskLevel::Critical {
                let alert = Alert::Site {
                    location: outcome.risk.weather.location.clone(),
                    wind_speed: outcome.risk.weather.wind_speed,
                };
                outcome.sms_sent = self
                    .dispatcher
                    .notify(RiskLevel::Critical, request.user_id.as_ref(), &alert)
                    .await;

                if let Some(certificate) = &request.certificate {
                    outcome.blockchain_data = self.flag_critical(certificate, &request, &evidence).await;
                    outcome.certificate_updated = outcome.blockchain_data.is_some();
                }
            }
            self.release(&evidence).await;
            Ok(outcome)
        }
        .instrument(span)
        .await
    }

    /// Scan every watch target of `user`, oldest first
    ///
    /// One target failing never stops the batch.
    ///
    /// # Errors
    /// Only when the watch-list itself cannot be read.
    pub async fn scan_all(&self, user: &UserId) -> Result<BatchSummary, CanopyError> {
        let span = tracing::info_span!("guardian_scan", %user);
        async {
            let targets = self.watchlist.list_by_user(user).await?;
            let destination = self.dispatcher.resolve_destination(Some(user)).await;
            tracing::info!(targets = targets.len(), "scan started");

            let mut summary = BatchSummary::default();
            for target in targets {
                let location = match Coordinates::new(target.lat, target.lng) {
                    Ok(location) => location,
                    Err(e) => {
                        summary.failures.push(TargetFailure {
                            id: target.id,
                            name: target.name,
                            error: e.to_string(),
                        });
                        continue;
                    }
                };

                let risk = match self.assess(location).await {
                    Ok(risk) => risk,
                    Err(e) => {
                        tracing::warn!(target = %target.name, error = %e, "target scan failed");
                        summary.failures.push(TargetFailure {
                            id: target.id,
                            name: target.name,
                            error: e.to_string(),
                        });
                        continue;
                    }
                };

                if let Err(e) = self.watchlist.record_check(target.id, risk.risk_level, Utc::now()).await {
                    tracing::warn!(target = %target.name, error = %e, "could not record target status");
                }

                let alert = Alert::WatchTarget {
                    name: target.name.clone(),
                    dryness_score: risk.dryness_score,
                };
                if self.dispatcher.dispatch(risk.risk_level, &destination, &alert).await {
                    summary.alerts_sent += 1;
                }

                summary.scanned += 1;
                summary.results.push(TargetResult {
                    id: target.id,
                    name: target.name,
                    status: risk.risk_level,
                });
            }

            tracing::info!(
                scanned = summary.scanned,
                failed = summary.failures.len(),
                alerts_sent = summary.alerts_sent,
                "scan finished"
            );
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    async fn assess_keeping(&self, location: Coordinates) -> Result<(RiskAssessment, EvidenceSet), CanopyError> {
        let weather = self.weather.current(location).await?;
        let evidence = self.collector.collect_moisture(location).await?;
        let dryness = match self.analyzer.run(&evidence).await {
            Ok(analysis) => analysis
                .dryness_score()
                .ok_or(AnalysisError::MissingField("dryness_score")),
            Err(e) => Err(e),
        };
        match dryness {
            Ok(dryness) => Ok((risk::score(&weather, dryness), evidence)),
            Err(e) => {
                self.release(&evidence).await;
                Err(e.into())
            }
        }
    }

    /// Update to CRITICAL, else mint a fire-risk certificate from the
    /// moisture image
    async fn flag_critical(
        &self,
        certificate: &CertificateRef,
        request: &PredictRequest,
        evidence: &EvidenceSet,
    ) -> Option<Value> {
        let update = UpdateRequest {
            contract_address: certificate.contract_address.clone(),
            token_id: certificate.token_id.clone(),
            status: CertificateStatus::Critical,
            carbon_tonnes: None,
        };
        match self.ledger.update_status(&update).await {
            Ok(Some(response)) => return Some(response),
            Ok(None) => tracing::warn!(token_id = %certificate.token_id, "critical status update declined, minting fallback"),
            Err(e) => tracing::warn!(token_id = %certificate.token_id, error = %e, "critical status update failed, minting fallback"),
        }

        let mint = MintRequest {
            image: evidence.current_index.path.clone(),
            subject: CertificateSubject::CriticalFireRisk,
            lat: request.location.lat,
            lng: request.location.lng,
            carbon_tonnes: None,
        };
        match self.ledger.mint(&mint).await {
            Ok(Some(receipt)) => serde_json::to_value(receipt).ok(),
            Ok(None) => {
                tracing::warn!("fire-risk mint declined");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "fire-risk mint failed");
                None
            }
        }
    }

    /// Moisture rasters are never served, so they go as soon as the check ends
    async fn release(&self, evidence: &EvidenceSet) {
        if let Err(e) = self.collector.discard(evidence).await {
            tracing::warn!(request_id = %evidence.request_id, error = %e, "failed to discard evidence");
        }
    }
}
