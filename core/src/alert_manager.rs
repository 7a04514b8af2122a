//! Turns assessments into alerts and recommendations, and drives stored
//! alerts through their lifecycle.

use crate::{
    aggregator::AggregatedScore,
    alert::{from_unit_score, Alert, AlertStatus, AlertType, NewAlert, Severity},
    anomaly::AnomalyResult,
    command::AlertAction,
    error::AmlResult,
    ml::MlPrediction,
    store::AmlStore,
    types::Timestamp,
};
use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

/// Aggregated (0–1) score at or above which a HIGH_RISK_SCORE alert is raised.
const ALERT_SCORE_THRESHOLD: f64 = 0.7;
/// ML recommendations must be strictly more likely than this.
const ML_RECOMMENDATION_THRESHOLD: f64 = 0.6;

const BLOCK_SCORE: f64 = 0.8;
const EDD_SCORE: f64 = 0.6;
const REVIEW_SCORE: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    Block,
    EnhanceDueDiligence,
    Review,
    Monitor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationPriority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: RecommendedAction,
    pub priority: RecommendationPriority,
    pub rationale: String,
}

/// Result of a stored transition.
#[derive(Debug, Clone)]
pub struct AlertTransition {
    pub from: AlertStatus,
    pub alert: Alert,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlertManager;

impl AlertManager {
    pub fn new() -> Self {
        Self
    }

    /// Every alert one assessment warrants. Each crossed threshold raises
    /// its own record.
    pub fn evaluate(
        &self,
        entity_id: &str,
        score: &AggregatedScore,
        prediction: &MlPrediction,
        anomaly: &AnomalyResult,
        now: Timestamp,
    ) -> AmlResult<Vec<Alert>> {
        let mut alerts = Vec::new();

        if score.overall >= ALERT_SCORE_THRESHOLD {
            alerts.push(Alert::raise(
                NewAlert {
                    entity_id: entity_id.to_string(),
                    alert_type: AlertType::HighRiskScore,
                    risk_score: from_unit_score(score.overall),
                    severity: None,
                    description: format!(
                        "Aggregated risk score {:.3} ({}) at or above {ALERT_SCORE_THRESHOLD}",
                        score.overall,
                        score.level.as_str()
                    ),
                },
                now,
            )?);
        }

        if anomaly.is_anomaly {
            let kinds: Vec<&str> = anomaly.anomaly_types.iter().map(String::as_str).collect();
            alerts.push(Alert::raise(
                NewAlert {
                    entity_id: entity_id.to_string(),
                    alert_type: AlertType::AnomalyDetected,
                    risk_score: from_unit_score(anomaly.anomaly_score),
                    severity: None,
                    description: format!(
                        "Anomalous activity (score {:.3}): {}",
                        anomaly.anomaly_score,
                        if kinds.is_empty() { "unspecified".to_string() } else { kinds.join(", ") }
                    ),
                },
                now,
            )?);
        }

        for rec in prediction
            .alert_recommendations
            .iter()
            .filter(|r| r.probability > ML_RECOMMENDATION_THRESHOLD)
        {
            alerts.push(Alert::raise(
                NewAlert {
                    entity_id: entity_id.to_string(),
                    alert_type: rec.alert_type,
                    risk_score: from_unit_score(rec.probability),
                    severity: rec.severity,
                    description: rec.reason.clone().unwrap_or_else(|| {
                        format!(
                            "Model {} recommends {} (p={:.2})",
                            prediction.model_version,
                            rec.alert_type.as_str(),
                            rec.probability
                        )
                    }),
                },
                now,
            )?);
        }

        Ok(alerts)
    }

    /// `alerts` are the entity's alerts that are still open, including
    /// any just raised.
    pub fn recommend(&self, overall_score: f64, alerts: &[Alert]) -> Recommendation {
        let severe = alerts.iter().filter(|a| a.severity >= Severity::High).count();

        let (action, priority, rationale) = if overall_score >= BLOCK_SCORE || severe > 0 {
            (
                RecommendedAction::Block,
                RecommendationPriority::Critical,
                format!("score {overall_score:.3}, {severe} open alert(s) of HIGH severity or above"),
            )
        } else if overall_score >= EDD_SCORE {
            (
                RecommendedAction::EnhanceDueDiligence,
                RecommendationPriority::High,
                format!("score {overall_score:.3} at or above {EDD_SCORE}"),
            )
        } else if overall_score >= REVIEW_SCORE || !alerts.is_empty() {
            (
                RecommendedAction::Review,
                RecommendationPriority::Medium,
                format!("score {overall_score:.3}, {} open alert(s)", alerts.len()),
            )
        } else {
            (
                RecommendedAction::Monitor,
                RecommendationPriority::Low,
                format!("score {overall_score:.3} below {REVIEW_SCORE}, no open alerts"),
            )
        };

        Recommendation { action, priority, rationale }
    }

    /// Apply `action` to the stored alert. The guard check and the write
    /// happen under one store lock.
    pub fn transition(
        &self,
        store: &dyn AmlStore,
        alert_id: &str,
        action: &AlertAction,
        now: Timestamp,
    ) -> AmlResult<AlertTransition> {
        let mut from = None;
        let alert = store.update_alert(alert_id, &mut |alert| {
            from = Some(alert.status);
            alert.apply(action, now)
        })?;

        Ok(AlertTransition { from: from.unwrap_or(alert.status), alert })
    }

    /// Open alerts past their due date, most overdue first.
    pub fn overdue_alerts(&self, alerts: Vec<Alert>, now: Timestamp) -> Vec<Alert> {
        let mut overdue: Vec<Alert> = alerts.into_iter().filter(|a| a.is_overdue(now)).collect();
        overdue.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        overdue
    }
}
