//! Service wiring
//!
//! [`Canopy`] owns one instance of every component. Production clients come
//! from [`Canopy::from_config`]; tests hand in their own [`Collaborators`].

use crate::certification::CertificationWorkflow;
use crate::config::{CanopyConfig, ConfigError};
use crate::error::CanopyError;
use crate::guardian::Guardian;
use crate::notify::{NotificationDispatcher, SmsGateway, TwilioGateway};
use crate::reconcile::Reconciler;
use crate::store::{
    AuditStore, InMemoryAuditStore, InMemorySettingsStore, InMemoryWatchlistStore, SettingsStore,
    WatchlistStore,
};
use crate::weather::{OpenWeatherClient, WeatherProvider};
use canopy_analyzer::{Analyzer, ProcessAnalyzer};
use canopy_evidence::{ArtifactStore, EvidenceCollector, ImageryProvider, SentinelHubClient};
use canopy_ledger::{CertificateLedger, ChainReader, JsonRpcChain, VerbwireLedger};
use std::sync::Arc;

/// External capabilities the pipeline is built from
#[derive(Clone)]
pub struct Collaborators {
    pub imagery: Arc<dyn ImageryProvider>,
    pub analyzer: Arc<dyn Analyzer>,
    pub ledger: Arc<dyn CertificateLedger>,
    pub chain: Arc<dyn ChainReader>,
    pub weather: Arc<dyn WeatherProvider>,
    pub sms: Option<Arc<dyn SmsGateway>>,
}

impl Collaborators {
    /// Production clients for every collaborator
    ///
    /// The SMS gateway is left out when Twilio is not configured.
    ///
    /// # Errors
    /// Fails when an HTTP client cannot be constructed.
    pub fn from_config(config: &CanopyConfig) -> Result<Self, CanopyError> {
        let sms: Option<Arc<dyn SmsGateway>> = if config.sms.is_configured() {
            let gateway = TwilioGateway::new(config.sms.clone())
                .map_err(|e| ConfigError::Invalid(format!("sms gateway: {e}")))?;
            Some(Arc::new(gateway))
        } else {
            tracing::warn!("sms gateway not configured, critical alerts will not be sent");
            None
        };

        Ok(Self {
            imagery: Arc::new(SentinelHubClient::new(config.imagery.clone())?),
            analyzer: Arc::new(ProcessAnalyzer::new(config.analyzer.clone())),
            ledger: Arc::new(VerbwireLedger::new(config.ledger.clone())?),
            chain: Arc::new(JsonRpcChain::new(config.chain.clone())?),
            weather: Arc::new(OpenWeatherClient::new(config.weather.clone())?),
            sms,
        })
    }
}

/// Record stores
#[derive(Clone)]
pub struct Stores {
    pub audits: Arc<dyn AuditStore>,
    pub watchlist: Arc<dyn WatchlistStore>,
    pub settings: Arc<dyn SettingsStore>,
}

impl Default for Stores {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl Stores {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            audits: Arc::new(InMemoryAuditStore::new()),
            watchlist: Arc::new(InMemoryWatchlistStore::new()),
            settings: Arc::new(InMemorySettingsStore::new()),
        }
    }
}

/// The assembled pipeline
#[derive(Clone)]
pub struct Canopy {
    config: Arc<CanopyConfig>,
    collector: EvidenceCollector,
    workflow: CertificationWorkflow,
    reconciler: Reconciler,
    guardian: Guardian,
    stores: Stores,
}

impl std::fmt::Debug for Canopy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canopy")
            .field("collector", &self.collector)
            .field("workflow", &self.workflow)
            .field("guardian", &self.guardian)
            .finish_non_exhaustive()
    }
}

impl Canopy {
    /// Production wiring with in-memory stores
    ///
    /// # Errors
    /// Client construction failures.
    pub fn from_config(config: CanopyConfig) -> Result<Self, CanopyError> {
        let collaborators = Collaborators::from_config(&config)?;
        Ok(Self::assemble(config, collaborators, Stores::in_memory()))
    }

    #[must_use]
    pub fn assemble(config: CanopyConfig, collaborators: Collaborators, stores: Stores) -> Self {
        let storage = &config.storage;
        let collector = EvidenceCollector::new(
            collaborators.imagery,
            ArtifactStore::new(storage.evidence_dir.clone()),
        );
        let dispatcher = NotificationDispatcher::new(
            collaborators.sms,
            stores.settings.clone(),
            config.sms.default_destination.clone(),
        );

        let workflow = CertificationWorkflow::new(
            collector.clone(),
            collaborators.analyzer.clone(),
            collaborators.ledger.clone(),
            stores.audits.clone(),
        );
        let workflow = if storage.retain_evidence {
            workflow.with_retained_requests(storage.max_retained_requests)
        } else {
            workflow
        };
        let reconciler = Reconciler::new(collaborators.chain, stores.audits.clone());
        let guardian = Guardian::new(
            collector.clone(),
            collaborators.analyzer,
            collaborators.weather,
            dispatcher,
            collaborators.ledger,
            stores.watchlist.clone(),
        );

        tracing::info!(
            evidence_dir = %storage.evidence_dir.display(),
            retain_evidence = storage.retain_evidence,
            max_retained_requests = storage.max_retained_requests,
            "pipeline assembled"
        );
        Self {
            config: Arc::new(config),
            collector,
            workflow,
            reconciler,
            guardian,
            stores,
        }
    }

    #[must_use]
    pub fn config(&self) -> &CanopyConfig {
        &self.config
    }

    #[must_use]
    pub fn collector(&self) -> &EvidenceCollector {
        &self.collector
    }

    #[must_use]
    pub fn workflow(&self) -> &CertificationWorkflow {
        &self.workflow
    }

    #[must_use]
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    #[must_use]
    pub fn guardian(&self) -> &Guardian {
        &self.guardian
    }

    #[must_use]
    pub fn audits(&self) -> &Arc<dyn AuditStore> {
        &self.stores.audits
    }

    #[must_use]
    pub fn watchlist(&self) -> &Arc<dyn WatchlistStore> {
        &self.stores.watchlist
    }

    #[must_use]
    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.stores.settings
    }
}
