//! Per-entity risk profile.
//!
//! Created on an entity's first assessment and superseded in place by
//! every later one. The only mutator is `update_risk_score`.

use crate::{
    aggregator::{AggregatedScore, RiskLevel},
    error::{AmlError, AmlResult},
    ml::MlPrediction,
    risk_factors::{EntityType, RiskFactors},
    types::{EntityId, Timestamp},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    entity_id: EntityId,
    pub entity_type: EntityType,
    pub overall_risk_score: f64,
    pub risk_level: RiskLevel,
    pub risk_factors: RiskFactors,
    pub ml_scoring: Option<MlPrediction>,
    pub last_assessment_date: Timestamp,
    pub next_review_date: Timestamp,
    pub assessment_count: u32,
}

impl RiskProfile {
    /// First assessment of an entity.
    pub fn create(
        entity_id: EntityId,
        entity_type: EntityType,
        score: &AggregatedScore,
        factors: RiskFactors,
        prediction: Option<MlPrediction>,
        assessed_at: Timestamp,
    ) -> AmlResult<Self> {
        let mut profile = Self {
            entity_id,
            entity_type,
            overall_risk_score: 0.0,
            risk_level: RiskLevel::VeryLow,
            risk_factors: RiskFactors::default(),
            ml_scoring: None,
            last_assessment_date: assessed_at,
            next_review_date: assessed_at,
            assessment_count: 0,
        };
        profile.update_risk_score(score, factors, prediction, assessed_at)?;
        Ok(profile)
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Apply a new assessment. Level and review date are re-derived from the
    /// score and anchored on `assessed_at`.
    pub fn update_risk_score(
        &mut self,
        score: &AggregatedScore,
        factors: RiskFactors,
        prediction: Option<MlPrediction>,
        assessed_at: Timestamp,
    ) -> AmlResult<()> {
        if !score.overall.is_finite() || !(0.0..=1.0).contains(&score.overall) {
            return Err(AmlError::Validation(format!(
                "profile score must be in [0, 1], got {}",
                score.overall
            )));
        }
        if assessed_at < self.last_assessment_date {
            return Err(AmlError::Validation(format!(
                "assessment at {assessed_at} predates last assessment {} for entity '{}'",
                self.last_assessment_date, self.entity_id
            )));
        }

        let level = RiskLevel::from_score(score.overall);
        self.overall_risk_score = score.overall;
        self.risk_level = level;
        self.risk_factors = factors;
        self.ml_scoring = prediction;
        self.last_assessment_date = assessed_at;
        self.next_review_date = level.next_review_date(assessed_at);
        self.assessment_count += 1;
        Ok(())
    }

    pub fn is_review_due(&self, now: Timestamp) -> bool {
        now >= self.next_review_date
    }
}
