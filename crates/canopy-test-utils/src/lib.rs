//! Testing utilities for Canopy workspace
//!
//! In-process fakes for every external collaborator, plus a [`Harness`]
//! that wires them into a [`Canopy`] over a temporary evidence directory.

#![allow(missing_docs)]

use async_trait::async_trait;
use canopy_analyzer::{parse_output, AnalysisError, AnalysisKind, AnalysisResult, Analyzer};
use canopy_core::{
    Canopy, CanopyConfig, Collaborators, NotifyError, SmsGateway, Stores, WeatherError,
    WeatherProvider, WeatherReport,
};
use canopy_evidence::{
    AccessToken, Coordinates, EvidenceError, EvidenceSet, ImageRequest, ImageryProvider, IndexLayer,
    RasterLayer,
};
use canopy_ledger::{
    CertificateLedger, ChainReader, LedgerError, LogEntry, MintReceipt, MintRequest, TokenId,
    TransactionReceipt, UpdateRequest, TRANSFER_TOPIC,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Amazon parcel used by the end-to-end examples
pub const AMAZON_LAT: f64 = -3.46;
pub const AMAZON_LNG: f64 = -62.21;

pub const VERIFIED_OUTPUT: &str = r#"{"status": "VERIFIED", "biomass_score": 92, "carbon_tonnes": 1200, "deforestation_percent": 0.4, "detected_features": ["Dense Canopy", "River"]}"#;
pub const REJECTED_OUTPUT: &str = r#"{"status": "REJECTED_DEFORESTATION_DETECTED", "biomass_score": 41, "carbon_tonnes": 300, "deforestation_percent": 18.5, "probable_cause": "clear-cut"}"#;

pub const TEST_CONTRACT: &str = "0x0D29A715d3a1E0763EB039D84ec8782b75C63F3e";

pub fn amazon() -> Coordinates {
    Coordinates::new(AMAZON_LAT, AMAZON_LNG).unwrap()
}

/// Imagery provider returning a small distinct payload per layer
#[derive(Debug, Default)]
pub struct FakeImagery {
    failing_layer: Option<RasterLayer>,
    failing_at: Vec<Coordinates>,
    auth_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl FakeImagery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(layer: RasterLayer) -> Self {
        Self {
            failing_layer: Some(layer),
            ..Self::default()
        }
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Fail every fetch whose box covers `location`
    pub fn failing_at(mut self, location: Coordinates) -> Self {
        self.failing_at.push(location);
        self
    }
}

#[async_trait]
impl ImageryProvider for FakeImagery {
    async fn authenticate(&self) -> Result<AccessToken, EvidenceError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        Ok(AccessToken::new("fake-token"))
    }

    async fn fetch_image(&self, _token: &AccessToken, request: &ImageRequest) -> Result<Vec<u8>, EvidenceError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_at.iter().any(|at| request.bbox.contains(*at)) {
            return Err(EvidenceError::Status {
                status: 504,
                body: "tile render timed out".into(),
            });
        }
        if self.failing_layer == Some(request.layer) {
            return Err(EvidenceError::Status {
                status: 503,
                body: "processing unavailable".into(),
            });
        }
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.extend_from_slice(request.layer.as_str().as_bytes());
        bytes.extend_from_slice(request.time_range.from.to_rfc3339().as_bytes());
        Ok(bytes)
    }
}

/// Analyzer with canned output per evidence layer
#[derive(Debug)]
pub struct ScriptedAnalyzer {
    audit_output: String,
    dryness: f64,
    dryness_at: Vec<(Coordinates, f64)>,
    failing_at: Vec<Coordinates>,
    calls: AtomicUsize,
}

impl Default for ScriptedAnalyzer {
    fn default() -> Self {
        Self {
            audit_output: VERIFIED_OUTPUT.to_string(),
            dryness: 10.0,
            dryness_at: Vec::new(),
            failing_at: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl ScriptedAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_audit_output(mut self, output: impl Into<String>) -> Self {
        self.audit_output = output.into();
        self
    }

    pub fn with_dryness(mut self, dryness: f64) -> Self {
        self.dryness = dryness;
        self
    }

    pub fn with_dryness_at(mut self, location: Coordinates, dryness: f64) -> Self {
        self.dryness_at.push((location, dryness));
        self
    }

    pub fn failing_at(mut self, location: Coordinates) -> Self {
        self.failing_at.push(location);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    async fn run(&self, evidence: &EvidenceSet) -> Result<AnalysisResult, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_at.contains(&evidence.location) {
            return Err(AnalysisError::Reported("engine crashed on tile".into()));
        }
        match evidence.layer {
            IndexLayer::Vegetation => parse_output(AnalysisKind::Audit, &self.audit_output),
            IndexLayer::Moisture => {
                let dryness = self
                    .dryness_at
                    .iter()
                    .find(|(at, _)| *at == evidence.location)
                    .map_or(self.dryness, |(_, d)| *d);
                parse_output(AnalysisKind::Guardian, &format!(r#"{{"dryness_score": {dryness}}}"#))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum MintScript {
    Receipt(MintReceipt),
    Declined,
    Fail,
}

#[derive(Debug, Clone)]
pub enum UpdateScript {
    Accepted(Value),
    Declined,
    Fail,
}

/// Ledger that records every call and answers from a script
#[derive(Debug)]
pub struct RecordingLedger {
    mint: MintScript,
    update: UpdateScript,
    mints: Mutex<Vec<MintRequest>>,
    updates: Mutex<Vec<UpdateRequest>>,
}

impl Default for RecordingLedger {
    fn default() -> Self {
        Self {
            mint: MintScript::Receipt(MintReceipt::new(
                Some("0xfeed".into()),
                TEST_CONTRACT,
                TokenId::Assigned("101".into()),
            )),
            update: UpdateScript::Accepted(serde_json::json!({"status": "success"})),
            mints: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
        }
    }
}

impl RecordingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mint(mut self, script: MintScript) -> Self {
        self.mint = script;
        self
    }

    pub fn with_update(mut self, script: UpdateScript) -> Self {
        self.update = script;
        self
    }

    pub fn mints(&self) -> Vec<MintRequest> {
        self.mints.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<UpdateRequest> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl CertificateLedger for RecordingLedger {
    async fn mint(&self, request: &MintRequest) -> Result<Option<MintReceipt>, LedgerError> {
        self.mints.lock().unwrap().push(request.clone());
        match &self.mint {
            MintScript::Receipt(receipt) => Ok(Some(receipt.clone())),
            MintScript::Declined => Ok(None),
            MintScript::Fail => Err(LedgerError::Decode("mint service unavailable".into())),
        }
    }

    async fn update_status(&self, request: &UpdateRequest) -> Result<Option<Value>, LedgerError> {
        self.updates.lock().unwrap().push(request.clone());
        match &self.update {
            UpdateScript::Accepted(value) => Ok(Some(value.clone())),
            UpdateScript::Declined => Ok(None),
            UpdateScript::Fail => Err(LedgerError::Decode("update service unavailable".into())),
        }
    }
}

/// Chain with receipts registered up front
#[derive(Debug, Default)]
pub struct FakeChain {
    receipts: Mutex<HashMap<String, TransactionReceipt>>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tx_hash: &str, receipt: TransactionReceipt) {
        self.receipts.lock().unwrap().insert(tx_hash.to_string(), receipt);
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TransactionReceipt>, LedgerError> {
        Ok(self.receipts.lock().unwrap().get(tx_hash).cloned())
    }
}

/// Receipt carrying a single ERC-721 mint Transfer log
pub fn transfer_receipt(tx_hash: &str, contract: &str, token_id: u128) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: Some(tx_hash.to_string()),
        status: Some("0x1".into()),
        logs: vec![LogEntry {
            address: contract.to_string(),
            topics: vec![
                TRANSFER_TOPIC.to_string(),
                format!("0x{:064x}", 0),
                format!("0x{:064x}", 0xabcu32),
                format!("0x{token_id:064x}"),
            ],
        }],
    }
}

/// SMS gateway that keeps every message
#[derive(Debug, Default)]
pub struct RecordingSms {
    failing: bool,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// `(to, body)` pairs in send order
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmsGateway for RecordingSms {
    async fn send(&self, to: &str, body: &str) -> Result<(), NotifyError> {
        if self.failing {
            return Err(NotifyError::Rejected {
                status: 400,
                body: "unverified number".into(),
            });
        }
        self.sent.lock().unwrap().push((to.to_string(), body.to_string()));
        Ok(())
    }
}

/// Same conditions everywhere, except where told to fail
#[derive(Debug)]
pub struct FixedWeather {
    report: WeatherReport,
    failing_at: Vec<Coordinates>,
}

impl Default for FixedWeather {
    fn default() -> Self {
        Self::calm()
    }
}

impl FixedWeather {
    /// 22 °C, 2 m/s
    pub fn calm() -> Self {
        Self::with(22.0, 2.0)
    }

    /// 33 °C, 9 m/s
    pub fn hot_and_windy() -> Self {
        Self::with(33.0, 9.0)
    }

    pub fn with(temperature: f64, wind_speed: f64) -> Self {
        Self {
            report: WeatherReport {
                location: "Manaus".into(),
                temperature,
                humidity: 35.0,
                wind_speed,
                description: "scattered clouds".into(),
            },
            failing_at: Vec::new(),
        }
    }

    pub fn failing_at(mut self, location: Coordinates) -> Self {
        self.failing_at.push(location);
        self
    }
}

#[async_trait]
impl WeatherProvider for FixedWeather {
    async fn current(&self, location: Coordinates) -> Result<WeatherReport, WeatherError> {
        if self.failing_at.contains(&location) {
            return Err(WeatherError::Status {
                status: 502,
                body: "upstream timeout".into(),
            });
        }
        Ok(self.report.clone())
    }
}

/// A fully wired [`Canopy`] over fakes
pub struct Harness {
    pub canopy: Canopy,
    pub imagery: Arc<FakeImagery>,
    pub analyzer: Arc<ScriptedAnalyzer>,
    pub ledger: Arc<RecordingLedger>,
    pub chain: Arc<FakeChain>,
    pub weather: Arc<FixedWeather>,
    pub sms: Arc<RecordingSms>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    /// Defaults: verified audit, calm weather, accepting ledger
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Request directories currently left in the evidence store
    pub fn request_dirs(&self) -> usize {
        std::fs::read_dir(self.dir.path().join("requests")).map_or(0, |entries| entries.count())
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
pub struct HarnessBuilder {
    imagery: Option<FakeImagery>,
    analyzer: Option<ScriptedAnalyzer>,
    ledger: Option<RecordingLedger>,
    weather: Option<FixedWeather>,
    sms: Option<RecordingSms>,
    default_phone: Option<String>,
    retain_evidence: Option<bool>,
    max_retained_requests: Option<usize>,
}

impl HarnessBuilder {
    pub fn imagery(mut self, imagery: FakeImagery) -> Self {
        self.imagery = Some(imagery);
        self
    }

    pub fn analyzer(mut self, analyzer: ScriptedAnalyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn ledger(mut self, ledger: RecordingLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn weather(mut self, weather: FixedWeather) -> Self {
        self.weather = Some(weather);
        self
    }

    pub fn sms(mut self, sms: RecordingSms) -> Self {
        self.sms = Some(sms);
        self
    }

    pub fn default_phone(mut self, phone: &str) -> Self {
        self.default_phone = Some(phone.to_string());
        self
    }

    pub fn retain_evidence(mut self, retain: bool) -> Self {
        self.retain_evidence = Some(retain);
        self
    }

    pub fn max_retained_requests(mut self, max: usize) -> Self {
        self.max_retained_requests = Some(max);
        self
    }

    pub fn build(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let imagery = Arc::new(self.imagery.unwrap_or_default());
        let analyzer = Arc::new(self.analyzer.unwrap_or_default());
        let ledger = Arc::new(self.ledger.unwrap_or_default());
        let chain = Arc::new(FakeChain::new());
        let weather = Arc::new(self.weather.unwrap_or_default());
        let sms = Arc::new(self.sms.unwrap_or_default());

        let mut config = CanopyConfig::default()
            .with_evidence_dir(dir.path())
            .with_retain_evidence(self.retain_evidence.unwrap_or(true));
        if let Some(max) = self.max_retained_requests {
            config = config.with_max_retained_requests(max);
        }
        config.sms.default_destination = self.default_phone;

        let collaborators = Collaborators {
            imagery: imagery.clone(),
            analyzer: analyzer.clone(),
            ledger: ledger.clone(),
            chain: chain.clone(),
            weather: weather.clone(),
            sms: Some(sms.clone()),
        };
        let canopy = Canopy::assemble(config, collaborators, Stores::in_memory());

        Harness {
            canopy,
            imagery,
            analyzer,
            ledger,
            chain,
            weather,
            sms,
            dir,
        }
    }
}
