use crate::report::ReviewRole;
use serde::{Deserialize, Serialize};

/// Terminal outcome chosen by the reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    Closed,
    FalsePositive,
}

/// Every operation an investigator can apply to an alert.
/// Variants are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AlertAction {
    Assign {
        user_id: String,
    },
    StartInvestigation {
        investigator_id: String,
    },
    Escalate {
        reason: String,
    },
    Resolve {
        reviewer_id: String,
        resolution: Resolution,
        #[serde(default)]
        notes: Option<String>,
    },
    UpdateRiskScore {
        score: f64,
    },
}

impl AlertAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Assign { .. } => "assign",
            Self::StartInvestigation { .. } => "start_investigation",
            Self::Escalate { .. } => "escalate",
            Self::Resolve { .. } => "resolve",
            Self::UpdateRiskScore { .. } => "update_risk_score",
        }
    }
}

/// Operations on a report other than filing it with the regulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReportAction {
    SignOff { role: ReviewRole, reviewer: String },
    SubmitForReview,
    Acknowledge,
    Reject { reason: String },
    Withdraw,
}

impl ReportAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SignOff { .. } => "sign_off",
            Self::SubmitForReview => "submit_for_review",
            Self::Acknowledge => "acknowledge",
            Self::Reject { .. } => "reject",
            Self::Withdraw => "withdraw",
        }
    }
}
