//! Anomaly detector contract and its deterministic fallback.
//!
//! Same guarantee as the ML predictor: `GuardedDetector::detect` always
//! returns a result, falling back to the local rule set when the external
//! detector is disabled, failing, slow, or returns out-of-range output.

use crate::{
    config::CollaboratorConfig,
    risk_factors::{clamp_unit, Channel, HistoricalBaseline},
    types::EntityId,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, sync::Arc, time::Duration};

// ── Fallback rule constants ──────────────────────────────────────────────────

const SPIKE_MULTIPLE: f64 = 3.0;
const LARGE_ROUND_THRESHOLD: f64 = 10_000.0;
const QUIET_HOURS_END: u8 = 5; // 00:00–04:59 local
const ANOMALY_THRESHOLD: f64 = 0.5;

/// Types of anomalies the local rule set can detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyType {
    AmountSpike,
    VelocitySpike,
    UnusualHour,
    LargeRoundAmount,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AmountSpike => "amount_spike",
            Self::VelocitySpike => "velocity_spike",
            Self::UnusualHour => "unusual_hour",
            Self::LargeRoundAmount => "large_round_amount",
        }
    }

    fn weight(&self) -> f64 {
        match self {
            Self::AmountSpike => 0.4,
            Self::VelocitySpike => 0.4,
            Self::UnusualHour => 0.2,
            Self::LargeRoundAmount => 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyFeatures {
    pub entity_id: EntityId,
    pub amount: f64,
    pub frequency: f64,
    pub hour_of_day: Option<u8>,
    pub channel: Option<Channel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub is_anomaly: bool,
    pub anomaly_score: f64,
    pub anomaly_types: BTreeSet<String>,
}

impl AnomalyResult {
    fn is_well_formed(&self) -> bool {
        self.anomaly_score.is_finite() && (0.0..=1.0).contains(&self.anomaly_score)
    }
}

/// The external anomaly-scoring service.
#[async_trait]
pub trait AnomalyDetector: Send + Sync {
    async fn detect(
        &self,
        features: &AnomalyFeatures,
        baseline: &HistoricalBaseline,
    ) -> anyhow::Result<AnomalyResult>;
}

/// Run the local rules. Deterministic for identical input.
pub fn fallback_detection(features: &AnomalyFeatures, baseline: &HistoricalBaseline) -> AnomalyResult {
    let mut hits = Vec::new();

    if baseline.average_amount > 0.0 && features.amount >= baseline.average_amount * SPIKE_MULTIPLE {
        hits.push(AnomalyType::AmountSpike);
    }
    if baseline.baseline_frequency > 0.0
        && features.frequency >= baseline.baseline_frequency * SPIKE_MULTIPLE
    {
        hits.push(AnomalyType::VelocitySpike);
    }
    if matches!(features.hour_of_day, Some(h) if h < QUIET_HOURS_END) {
        hits.push(AnomalyType::UnusualHour);
    }
    if features.amount >= LARGE_ROUND_THRESHOLD && features.amount % 1_000.0 == 0.0 {
        hits.push(AnomalyType::LargeRoundAmount);
    }

    let anomaly_score = clamp_unit(hits.iter().map(AnomalyType::weight).sum());
    AnomalyResult {
        is_anomaly: anomaly_score >= ANOMALY_THRESHOLD,
        anomaly_score,
        anomaly_types: hits.iter().map(|t| t.as_str().to_string()).collect(),
    }
}

#[derive(Clone)]
pub struct GuardedDetector {
    inner: Option<Arc<dyn AnomalyDetector>>,
    enabled: bool,
    timeout: Duration,
}

impl GuardedDetector {
    pub fn new(inner: Option<Arc<dyn AnomalyDetector>>, config: &CollaboratorConfig) -> Self {
        Self { inner, enabled: config.enabled, timeout: config.timeout() }
    }

    pub fn disabled() -> Self {
        Self { inner: None, enabled: false, timeout: Duration::ZERO }
    }

    pub async fn detect(&self, features: &AnomalyFeatures, baseline: &HistoricalBaseline) -> AnomalyResult {
        let inner = match (&self.inner, self.enabled) {
            (Some(inner), true) => inner,
            _ => return fallback_detection(features, baseline),
        };

        match tokio::time::timeout(self.timeout, inner.detect(features, baseline)).await {
            Ok(Ok(result)) if result.is_well_formed() => result,
            Ok(Ok(result)) => {
                log::warn!(
                    "entity={} anomaly score {} out of range, using fallback",
                    features.entity_id,
                    result.anomaly_score
                );
                fallback_detection(features, baseline)
            }
            Ok(Err(e)) => {
                log::warn!("entity={} anomaly detector failed: {e}, using fallback", features.entity_id);
                fallback_detection(features, baseline)
            }
            Err(_) => {
                log::warn!(
                    "entity={} anomaly detector timed out after {:?}, using fallback",
                    features.entity_id,
                    self.timeout
                );
                fallback_detection(features, baseline)
            }
        }
    }
}
