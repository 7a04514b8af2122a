//! Score aggregation: rules + ML + anomaly into one [0, 1] score.

use crate::{
    anomaly::AnomalyResult,
    ml::MlPrediction,
    risk_factors::{clamp_unit, RiskFactors},
    types::Timestamp,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};

// ── Weights ──────────────────────────────────────────────────────────────────
// Sum to 1.0. The channel factor is intentionally absent.

const W_GEOGRAPHIC: f64 = 0.15;
const W_TRANSACTION_PATTERN: f64 = 0.20;
const W_VELOCITY: f64 = 0.15;
const W_SANCTIONS: f64 = 0.25;
const W_PEP: f64 = 0.10;
const W_ADVERSE_MEDIA: f64 = 0.05;
const W_INDUSTRY: f64 = 0.05;
const W_BEHAVIORAL: f64 = 0.05;

const W_TRADITIONAL: f64 = 0.4;
const W_ML: f64 = 0.6;
const ANOMALY_BOOST: f64 = 0.2;

/// Weighted rule-based score.
pub fn traditional_score(f: &RiskFactors) -> f64 {
    clamp_unit(
        W_GEOGRAPHIC * f.geographic
            + W_TRANSACTION_PATTERN * f.transaction_pattern
            + W_VELOCITY * f.velocity
            + W_SANCTIONS * f.sanctions
            + W_PEP * f.pep
            + W_ADVERSE_MEDIA * f.adverse_media
            + W_INDUSTRY * f.industry
            + W_BEHAVIORAL * f.behavioral,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
    Critical,
}

impl RiskLevel {
    /// Monotonic thresholds on the final 0–1 score.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            Self::Critical
        } else if score >= 0.75 {
            Self::VeryHigh
        } else if score >= 0.6 {
            Self::High
        } else if score >= 0.4 {
            Self::Medium
        } else if score >= 0.2 {
            Self::Low
        } else {
            Self::VeryLow
        }
    }

    pub fn review_interval(&self) -> Duration {
        match self {
            Self::Critical => Duration::days(7),
            Self::VeryHigh => Duration::days(14),
            Self::High => Duration::days(30),
            Self::Medium => Duration::days(60),
            Self::Low | Self::VeryLow => Duration::days(90),
        }
    }

    /// Next scheduled review, anchored on the assessment instant.
    pub fn next_review_date(&self, assessed_at: Timestamp) -> Timestamp {
        assessed_at + self.review_interval()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryLow => "VERY_LOW",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::VeryHigh => "VERY_HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Breakdown of one aggregation, kept for explainability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatedScore {
    pub traditional: f64,
    pub ml: f64,
    pub anomaly_boost: f64,
    pub overall: f64,
    pub level: RiskLevel,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RiskScoreAggregator;

impl RiskScoreAggregator {
    pub fn new() -> Self {
        Self
    }

    pub fn aggregate(
        &self,
        factors: &RiskFactors,
        prediction: &MlPrediction,
        anomaly: &AnomalyResult,
    ) -> AggregatedScore {
        let traditional = traditional_score(factors);
        let ml = clamp_unit(prediction.risk_score);
        let combined = W_TRADITIONAL * traditional + W_ML * ml;

        let (combined, anomaly_boost) = if anomaly.is_anomaly {
            let boosted = (combined + clamp_unit(anomaly.anomaly_score) * ANOMALY_BOOST).min(1.0);
            (boosted, boosted - combined)
        } else {
            (combined, 0.0)
        };

        let overall = clamp_unit(combined);
        AggregatedScore {
            traditional,
            ml,
            anomaly_boost,
            overall,
            level: RiskLevel::from_score(overall),
        }
    }
}
