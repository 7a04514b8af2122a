//! ML risk predictor contract and its deterministic fallback.
//!
//! The aggregator must always receive a prediction. `GuardedPredictor`
//! owns that guarantee: a disabled predictor is never called, and a
//! failing, slow, or out-of-range predictor is replaced by the fallback.

use crate::{
    aggregator::traditional_score,
    alert::{AlertType, Severity},
    config::CollaboratorConfig,
    risk_factors::{clamp_unit, EntityType, RiskFactors},
    types::EntityId,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

pub const FALLBACK_MODEL_VERSION: &str = "fallback-heuristic-v1";
const FALLBACK_FLOOR: f64 = 0.3;
const FALLBACK_SPAN: f64 = 0.4;
const FALLBACK_CONFIDENCE: f64 = 0.5;
const TOP_FEATURE_COUNT: usize = 3;

/// Model input assembled from the assessment context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlFeatures {
    pub entity_id: EntityId,
    pub entity_type: EntityType,
    pub amount: f64,
    pub frequency: f64,
    pub account_age_days: u32,
    pub kyc_level: u8,
    pub factors: RiskFactors,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub name: String,
    pub importance: f64,
}

/// An alert the model proposes. Raised only above the probability threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecommendation {
    pub alert_type: AlertType,
    pub probability: f64,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlPrediction {
    pub risk_score: f64,
    pub confidence: f64,
    pub model_version: String,
    pub top_features: Vec<FeatureContribution>,
    #[serde(default)]
    pub alert_recommendations: Vec<AlertRecommendation>,
}

impl MlPrediction {
    pub fn is_fallback(&self) -> bool {
        self.model_version == FALLBACK_MODEL_VERSION
    }

    /// A prediction from an external model is only trusted when every
    /// probability-like field is a finite value in [0, 1].
    fn is_well_formed(&self) -> bool {
        in_unit(self.risk_score)
            && in_unit(self.confidence)
            && self.alert_recommendations.iter().all(|r| in_unit(r.probability))
    }
}

fn in_unit(x: f64) -> bool {
    x.is_finite() && (0.0..=1.0).contains(&x)
}

/// The external prediction service.
#[async_trait]
pub trait MlPredictor: Send + Sync {
    async fn predict(&self, features: &MlFeatures) -> anyhow::Result<MlPrediction>;
}

/// Deterministic offline prediction: `0.3 + 0.4 * traditional`, kept in
/// the 0.3–0.7 band, except that a sanctions hit is always scored 1.0.
pub fn fallback_prediction(features: &MlFeatures) -> MlPrediction {
    let factors = &features.factors;
    let risk_score = if factors.sanctions >= 1.0 {
        1.0
    } else {
        clamp_unit(FALLBACK_FLOOR + FALLBACK_SPAN * traditional_score(factors))
    };

    let mut ranked: Vec<(&'static str, f64)> = factors
        .named()
        .into_iter()
        .filter(|(_, v)| *v > 0.0)
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    MlPrediction {
        risk_score,
        confidence: FALLBACK_CONFIDENCE,
        model_version: FALLBACK_MODEL_VERSION.to_string(),
        top_features: ranked
            .into_iter()
            .take(TOP_FEATURE_COUNT)
            .map(|(name, importance)| FeatureContribution { name: name.to_string(), importance })
            .collect(),
        alert_recommendations: Vec::new(),
    }
}

/// Wraps an optional external predictor with the enable switch, a timeout,
/// and the fallback. `predict` is infallible.
#[derive(Clone)]
pub struct GuardedPredictor {
    inner: Option<Arc<dyn MlPredictor>>,
    enabled: bool,
    timeout: Duration,
}

impl GuardedPredictor {
    pub fn new(inner: Option<Arc<dyn MlPredictor>>, config: &CollaboratorConfig) -> Self {
        Self { inner, enabled: config.enabled, timeout: config.timeout() }
    }

    /// A predictor that always uses the fallback.
    pub fn disabled() -> Self {
        Self { inner: None, enabled: false, timeout: Duration::ZERO }
    }

    pub async fn predict(&self, features: &MlFeatures) -> MlPrediction {
        let inner = match (&self.inner, self.enabled) {
            (Some(inner), true) => inner,
            _ => return fallback_prediction(features),
        };

        match tokio::time::timeout(self.timeout, inner.predict(features)).await {
            Ok(Ok(prediction)) if prediction.is_well_formed() => prediction,
            Ok(Ok(prediction)) => {
                log::warn!(
                    "entity={} ML prediction out of range (score={}, confidence={}), using fallback",
                    features.entity_id,
                    prediction.risk_score,
                    prediction.confidence
                );
                fallback_prediction(features)
            }
            Ok(Err(e)) => {
                log::warn!("entity={} ML predictor failed: {e}, using fallback", features.entity_id);
                fallback_prediction(features)
            }
            Err(_) => {
                log::warn!(
                    "entity={} ML predictor timed out after {:?}, using fallback",
                    features.entity_id,
                    self.timeout
                );
                fallback_prediction(features)
            }
        }
    }
}
