//! Alert entity and its investigation state machine.
//!
//! Lifecycle:
//!   NEW → IN_REVIEW → INVESTIGATED → CLOSED | FALSE_POSITIVE
//!   any non-terminal state → ESCALATED
//!
//! RULE: every guard is checked before any field is written, so a
//! rejected transition leaves the alert exactly as it was.
//!
//! Alert risk scores live on a 0–100 scale. The 0–1 assessment score is
//! converted at creation (`from_unit_score`).

use crate::{
    command::{AlertAction, Resolution},
    error::{AmlError, AmlResult},
    types::{AlertId, EntityId, Timestamp},
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const CRITICAL_SCORE: f64 = 90.0;
const HIGH_SCORE: f64 = 70.0;
const MEDIUM_SCORE: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    HighRiskScore,
    AnomalyDetected,
    SanctionsMatch,
    PepMatch,
    HighRiskJurisdiction,
    Structuring,
    Velocity,
    RapidMovement,
    UnusualPattern,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighRiskScore => "HIGH_RISK_SCORE",
            Self::AnomalyDetected => "ANOMALY_DETECTED",
            Self::SanctionsMatch => "SANCTIONS_MATCH",
            Self::PepMatch => "PEP_MATCH",
            Self::HighRiskJurisdiction => "HIGH_RISK_JURISDICTION",
            Self::Structuring => "STRUCTURING",
            Self::Velocity => "VELOCITY",
            Self::RapidMovement => "RAPID_MOVEMENT",
            Self::UnusualPattern => "UNUSUAL_PATTERN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Severity for a 0–100 alert score.
    pub fn from_score(score: f64) -> Self {
        if score >= CRITICAL_SCORE {
            Self::Critical
        } else if score >= HIGH_SCORE {
            Self::High
        } else if score >= MEDIUM_SCORE {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Urgent => "URGENT",
        }
    }

    pub fn for_severity(severity: Severity) -> Self {
        match severity {
            Severity::Critical => Self::Urgent,
            Severity::High => Self::High,
            Severity::Medium => Self::Medium,
            Severity::Low => Self::Low,
        }
    }

    /// Time allowed from creation to investigation.
    pub fn sla(&self) -> Duration {
        match self {
            Self::Urgent => Duration::hours(4),
            Self::High => Duration::hours(24),
            Self::Medium => Duration::hours(72),
            Self::Low => Duration::hours(168),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    New,
    InReview,
    Investigated,
    Escalated,
    Closed,
    FalsePositive,
}

impl AlertStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::FalsePositive)
    }

    /// States a regulatory report may be drafted from.
    pub fn is_reportable(&self) -> bool {
        matches!(self, Self::Closed | Self::Escalated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::InReview => "IN_REVIEW",
            Self::Investigated => "INVESTIGATED",
            Self::Escalated => "ESCALATED",
            Self::Closed => "CLOSED",
            Self::FalsePositive => "FALSE_POSITIVE",
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for raising a new alert.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub entity_id: EntityId,
    pub alert_type: AlertType,
    /// 0–100 scale.
    pub risk_score: f64,
    /// Overrides the score-derived severity when the source supplies one.
    pub severity: Option<Severity>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub entity_id: EntityId,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub priority: Priority,
    pub status: AlertStatus,
    pub risk_score: f64,
    pub description: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Fixed at creation from the initial priority.
    pub due_date: Timestamp,
    pub assigned_to: Option<String>,
    pub investigator: Option<String>,
    pub resolved_at: Option<Timestamp>,
    pub resolved_by: Option<String>,
    pub resolution_notes: Option<String>,
    pub escalated_at: Option<Timestamp>,
    pub escalation_reason: Option<String>,
}

/// Convert a 0–1 assessment score to the 0–100 alert scale.
pub fn from_unit_score(score: f64) -> f64 {
    (score * 100.0).clamp(0.0, 100.0)
}

fn check_alert_score(score: f64) -> AmlResult<()> {
    if !score.is_finite() || !(0.0..=100.0).contains(&score) {
        return Err(AmlError::Validation(format!(
            "alert risk score must be in [0, 100], got {score}"
        )));
    }
    Ok(())
}

impl Alert {
    pub fn raise(new: NewAlert, created_at: Timestamp) -> AmlResult<Self> {
        check_alert_score(new.risk_score)?;
        if new.entity_id.trim().is_empty() {
            return Err(AmlError::Validation("alert entity_id is required".into()));
        }

        let severity = new.severity.unwrap_or_else(|| Severity::from_score(new.risk_score));
        let priority = Priority::for_severity(severity);

        Ok(Self {
            id: format!("alert-{}", Uuid::new_v4()),
            entity_id: new.entity_id,
            alert_type: new.alert_type,
            severity,
            priority,
            status: AlertStatus::New,
            risk_score: new.risk_score,
            description: new.description,
            created_at,
            updated_at: created_at,
            due_date: created_at + priority.sla(),
            assigned_to: None,
            investigator: None,
            resolved_at: None,
            resolved_by: None,
            resolution_notes: None,
            escalated_at: None,
            escalation_reason: None,
        })
    }

    pub fn is_overdue(&self, now: Timestamp) -> bool {
        !self.status.is_terminal() && now > self.due_date
    }

    pub fn apply(&mut self, action: &AlertAction, at: Timestamp) -> AmlResult<()> {
        match action {
            AlertAction::Assign { user_id } => self.assign(user_id, at),
            AlertAction::StartInvestigation { investigator_id } => {
                self.start_investigation(investigator_id, at)
            }
            AlertAction::Escalate { reason } => self.escalate(reason, at),
            AlertAction::Resolve { reviewer_id, resolution, notes } => {
                self.resolve(reviewer_id, *resolution, notes.as_deref(), at)
            }
            AlertAction::UpdateRiskScore { score } => self.update_risk_score(*score, at),
        }
    }

    pub fn assign(&mut self, user_id: &str, at: Timestamp) -> AmlResult<()> {
        if self.status.is_terminal() {
            return Err(self.illegal("assign"));
        }
        require_actor("user_id", user_id)?;

        self.assigned_to = Some(user_id.to_string());
        if self.status == AlertStatus::New {
            self.status = AlertStatus::InReview;
        }
        self.updated_at = at;
        Ok(())
    }

    pub fn start_investigation(&mut self, investigator_id: &str, at: Timestamp) -> AmlResult<()> {
        if self.status != AlertStatus::InReview {
            return Err(self.illegal("start_investigation"));
        }
        require_actor("investigator_id", investigator_id)?;

        self.investigator = Some(investigator_id.to_string());
        self.status = AlertStatus::Investigated;
        self.updated_at = at;
        Ok(())
    }

    pub fn escalate(&mut self, reason: &str, at: Timestamp) -> AmlResult<()> {
        if self.status.is_terminal() {
            return Err(self.illegal("escalate"));
        }
        require_actor("reason", reason)?;

        self.status = AlertStatus::Escalated;
        self.priority = Priority::Urgent;
        self.escalation_reason = Some(reason.to_string());
        if self.escalated_at.is_none() {
            self.escalated_at = Some(at);
        }
        self.updated_at = at;
        Ok(())
    }

    pub fn resolve(
        &mut self,
        reviewer_id: &str,
        resolution: Resolution,
        notes: Option<&str>,
        at: Timestamp,
    ) -> AmlResult<()> {
        if self.status == AlertStatus::New || self.status.is_terminal() {
            return Err(self.illegal("resolve"));
        }
        require_actor("reviewer_id", reviewer_id)?;

        self.status = match resolution {
            Resolution::Closed => AlertStatus::Closed,
            Resolution::FalsePositive => AlertStatus::FalsePositive,
        };
        self.resolved_by = Some(reviewer_id.to_string());
        self.resolution_notes = notes.map(str::to_string);
        self.resolved_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// Rescore on the 0–100 scale. The due date is not recomputed.
    pub fn update_risk_score(&mut self, score: f64, at: Timestamp) -> AmlResult<()> {
        check_alert_score(score)?;

        let severity = Severity::from_score(score);
        let priority = match severity {
            Severity::Critical => Some(Priority::Urgent),
            Severity::High => Some(Priority::High),
            Severity::Medium | Severity::Low => None,
        };

        self.risk_score = score;
        self.severity = severity;
        if let Some(priority) = priority {
            // An escalation's URGENT priority is never lowered by a rescore.
            if self.status != AlertStatus::Escalated {
                self.priority = priority;
            }
        }
        self.updated_at = at;
        Ok(())
    }

    fn illegal(&self, action: &'static str) -> AmlError {
        AmlError::IllegalTransition {
            kind: "alert",
            id: self.id.clone(),
            from: self.status.to_string(),
            action,
        }
    }
}

fn require_actor(field: &str, value: &str) -> AmlResult<()> {
    if value.trim().is_empty() {
        return Err(AmlError::Validation(format!("{field} is required")));
    }
    Ok(())
}
