//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use aml_core::{
    anomaly::{AnomalyDetector, AnomalyFeatures, AnomalyResult},
    clock::FixedClock,
    config::{CollaboratorConfig, EngineConfig},
    ml::{AlertRecommendation, FeatureContribution, MlFeatures, MlPrediction, MlPredictor},
    regulator::{RegulatorSubmit, SubmissionReceipt},
    report::RegulatoryReport,
    risk_factors::{ComplianceFlags, EntityContext, EntityType, HistoricalBaseline},
    screening::{FatfStatus, GeoRisk, GeoRiskResult},
    store::{AmlStore, MemoryStore},
    types::Timestamp,
    AmlEngine, EngineBuilder,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::{sync::Arc, time::Duration};

pub fn t(y: i32, m: u32, d: u32, h: u32) -> Timestamp {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

/// A long-standing, fully verified customer in a low-risk country with
/// no transaction in view. Traditional score 0.01 (industry "software").
pub fn quiet_context(entity_id: &str) -> EntityContext {
    EntityContext {
        entity_id: entity_id.into(),
        entity_type: EntityType::Individual,
        name: None,
        jurisdiction: "US".into(),
        transaction: None,
        baseline: HistoricalBaseline { average_amount: 1_000.0, baseline_frequency: 4.0 },
        flags: ComplianceFlags::default(),
        industry_code: Some("software".into()),
        account_age_days: 3_650,
        kyc_level: 3,
    }
}

pub struct Harness {
    pub engine: Arc<AmlEngine>,
    pub clock: Arc<FixedClock>,
    pub store: Arc<dyn AmlStore>,
}

pub fn builder_at(start: Timestamp, config: EngineConfig) -> (EngineBuilder, Arc<FixedClock>, Arc<dyn AmlStore>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = Arc::new(FixedClock::new(start));
    let store: Arc<dyn AmlStore> = Arc::new(MemoryStore::new());
    let builder = AmlEngine::builder(config, store.clone()).clock(clock.clone());
    (builder, clock, store)
}

/// Engine with every outbound collaborator disabled.
pub fn offline_engine(start: Timestamp) -> Harness {
    let (builder, clock, store) = builder_at(start, EngineConfig::default_test());
    Harness { engine: Arc::new(builder.build()), clock, store }
}

/// Config with the ML predictor and anomaly detector switched on.
pub fn online_config() -> EngineConfig {
    let mut config = EngineConfig::default_test();
    config.ml = CollaboratorConfig { enabled: true, timeout_ms: 200 };
    config.anomaly = CollaboratorConfig { enabled: true, timeout_ms: 200 };
    config
}

// ── Collaborator doubles ─────────────────────────────────────────────────────

pub struct FixedPredictor {
    pub score: f64,
    pub recommendations: Vec<AlertRecommendation>,
}

#[async_trait]
impl MlPredictor for FixedPredictor {
    async fn predict(&self, _features: &MlFeatures) -> anyhow::Result<MlPrediction> {
        Ok(MlPrediction {
            risk_score: self.score,
            confidence: 0.9,
            model_version: "champion-7".into(),
            top_features: vec![FeatureContribution { name: "velocity".into(), importance: 0.4 }],
            alert_recommendations: self.recommendations.clone(),
        })
    }
}

pub struct FailingPredictor;

#[async_trait]
impl MlPredictor for FailingPredictor {
    async fn predict(&self, _features: &MlFeatures) -> anyhow::Result<MlPrediction> {
        anyhow::bail!("connection refused")
    }
}

pub struct SlowPredictor;

#[async_trait]
impl MlPredictor for SlowPredictor {
    async fn predict(&self, _features: &MlFeatures) -> anyhow::Result<MlPrediction> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        anyhow::bail!("too late")
    }
}

pub struct FixedDetector(pub AnomalyResult);

#[async_trait]
impl AnomalyDetector for FixedDetector {
    async fn detect(&self, _features: &AnomalyFeatures, _baseline: &HistoricalBaseline) -> anyhow::Result<AnomalyResult> {
        Ok(self.0.clone())
    }
}

/// Answers after a fixed delay.
pub struct DelayedPredictor(pub Duration);

#[async_trait]
impl MlPredictor for DelayedPredictor {
    async fn predict(&self, _features: &MlFeatures) -> anyhow::Result<MlPrediction> {
        tokio::time::sleep(self.0).await;
        Ok(MlPrediction {
            risk_score: 0.4,
            confidence: 0.8,
            model_version: "champion-7".into(),
            top_features: vec![],
            alert_recommendations: vec![],
        })
    }
}

pub struct DelayedDetector(pub Duration, pub AnomalyResult);

#[async_trait]
impl AnomalyDetector for DelayedDetector {
    async fn detect(&self, _features: &AnomalyFeatures, _baseline: &HistoricalBaseline) -> anyhow::Result<AnomalyResult> {
        tokio::time::sleep(self.0).await;
        Ok(self.1.clone())
    }
}

/// Treats exactly the listed countries as sanctioned; everything else is compliant.
pub struct ListedSanctions(pub Vec<&'static str>);

impl GeoRisk for ListedSanctions {
    fn assess(&self, country: &str) -> GeoRiskResult {
        let sanctioned = self.0.iter().any(|c| c.eq_ignore_ascii_case(country));
        GeoRiskResult {
            risk_score: if sanctioned { 1.0 } else { 0.0 },
            sanctioned,
            fatf_status: FatfStatus::Compliant,
        }
    }
}

pub struct DownRegulator;

#[async_trait]
impl RegulatorSubmit for DownRegulator {
    async fn submit(&self, _report: &RegulatoryReport) -> anyhow::Result<SubmissionReceipt> {
        anyhow::bail!("gateway returned 503")
    }
}

/// Regulator that parks every call until `release` is notified.
#[derive(Default)]
pub struct GatedRegulator {
    pub entered: tokio::sync::Notify,
    pub release: tokio::sync::Notify,
    pub accepted: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl RegulatorSubmit for GatedRegulator {
    async fn submit(&self, report: &RegulatoryReport) -> anyhow::Result<SubmissionReceipt> {
        self.entered.notify_one();
        self.release.notified().await;
        let n = self.accepted.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        Ok(SubmissionReceipt {
            submission_id: format!("{}-{n:06}", report.report_type.as_str()),
            acknowledgment_number: format!("ACK{n:08X}"),
        })
    }
}
