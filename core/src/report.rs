//! Regulatory report (SAR / CTR) entity.
//!
//! Lifecycle:
//!   DRAFT → PENDING_REVIEW → SUBMITTED → ACKNOWLEDGED
//!   SUBMITTED → REJECTED
//!   DRAFT | PENDING_REVIEW → WITHDRAWN
//!   SUBMITTED | ACKNOWLEDGED | REJECTED → AMENDED (a new draft takes over)
//!
//! `filing_deadline` is fixed at creation and never moves.

use crate::{
    alert::Alert,
    command::ReportAction,
    error::{AmlError, AmlResult},
    regulator::SubmissionReceipt,
    risk_factors::EntityType,
    types::{AlertId, EntityId, ReportId, Timestamp},
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cash transactions above this amount must be reported on a CTR.
pub const CTR_THRESHOLD: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportType {
    Sar,
    Ctr,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sar => "SAR",
            Self::Ctr => "CTR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Draft,
    PendingReview,
    Submitted,
    Acknowledged,
    Rejected,
    Amended,
    Withdrawn,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::PendingReview => "PENDING_REVIEW",
            Self::Submitted => "SUBMITTED",
            Self::Acknowledged => "ACKNOWLEDGED",
            Self::Rejected => "REJECTED",
            Self::Amended => "AMENDED",
            Self::Withdrawn => "WITHDRAWN",
        }
    }

    /// Not yet in the regulator's hands.
    pub fn is_unfiled(&self) -> bool {
        matches!(self, Self::Draft | Self::PendingReview)
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportingInstitution {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSubject {
    pub entity_id: EntityId,
    pub name: String,
    #[serde(default)]
    pub entity_type: Option<EntityType>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewRole {
    QualityAssurance,
    ComplianceOfficer,
    Legal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignOff {
    pub reviewer: String,
    pub signed_at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewFlags {
    pub qa_review: Option<SignOff>,
    pub compliance_officer_review: Option<SignOff>,
    pub legal_review: Option<SignOff>,
}

impl ReviewFlags {
    pub fn is_fully_reviewed(&self) -> bool {
        self.qa_review.is_some()
            && self.compliance_officer_review.is_some()
            && self.legal_review.is_some()
    }

    fn slot_mut(&mut self, role: ReviewRole) -> &mut Option<SignOff> {
        match role {
            ReviewRole::QualityAssurance => &mut self.qa_review,
            ReviewRole::ComplianceOfficer => &mut self.compliance_officer_review,
            ReviewRole::Legal => &mut self.legal_review,
        }
    }
}

/// Caller-supplied content for a new report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDraft {
    pub report_type: ReportType,
    pub subject_name: String,
    #[serde(default)]
    pub subject_type: Option<EntityType>,
    #[serde(default)]
    pub subject_country: Option<String>,
    pub narrative_description: String,
    pub total_amount_involved: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegulatoryReport {
    pub id: ReportId,
    pub alert_id: AlertId,
    pub entity_id: EntityId,
    pub report_type: ReportType,
    pub status: ReportStatus,
    pub institution: ReportingInstitution,
    pub subject: ReportSubject,
    pub narrative_description: String,
    pub total_amount_involved: f64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub filing_deadline: Timestamp,
    pub filing_date: Option<Timestamp>,
    pub submission_id: Option<String>,
    pub acknowledgment_number: Option<String>,
    pub rejection_reason: Option<String>,
    /// Report this one supersedes.
    pub amends: Option<ReportId>,
    /// Report that superseded this one.
    pub amended_by: Option<ReportId>,
    pub reviews: ReviewFlags,
}

impl RegulatoryReport {
    pub fn draft(
        alert: &Alert,
        draft: ReportDraft,
        institution: ReportingInstitution,
        created_at: Timestamp,
        deadline_days: i64,
    ) -> Self {
        Self {
            id: format!("report-{}", Uuid::new_v4()),
            alert_id: alert.id.clone(),
            entity_id: alert.entity_id.clone(),
            report_type: draft.report_type,
            status: ReportStatus::Draft,
            institution,
            subject: ReportSubject {
                entity_id: alert.entity_id.clone(),
                name: draft.subject_name,
                entity_type: draft.subject_type,
                country: draft.subject_country,
            },
            narrative_description: draft.narrative_description,
            total_amount_involved: draft.total_amount_involved,
            created_at,
            updated_at: created_at,
            filing_deadline: created_at + Duration::days(deadline_days),
            filing_date: None,
            submission_id: None,
            acknowledgment_number: None,
            rejection_reason: None,
            amends: None,
            amended_by: None,
            reviews: ReviewFlags::default(),
        }
    }

    /// Fresh draft carrying this report's content forward. The new report
    /// gets its own id and its own filing deadline.
    pub fn amendment(&self, created_at: Timestamp, deadline_days: i64) -> Self {
        Self {
            id: format!("report-{}", Uuid::new_v4()),
            status: ReportStatus::Draft,
            created_at,
            updated_at: created_at,
            filing_deadline: created_at + Duration::days(deadline_days),
            filing_date: None,
            submission_id: None,
            acknowledgment_number: None,
            rejection_reason: None,
            amends: Some(self.id.clone()),
            amended_by: None,
            reviews: ReviewFlags::default(),
            ..self.clone()
        }
    }

    pub fn late_filing(&self) -> bool {
        self.filing_date.is_some_and(|filed| filed > self.filing_deadline)
    }

    /// Every reason this report cannot be filed. Empty when it can.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.institution.name.trim().is_empty() {
            issues.push("reporting institution name is missing".to_string());
        }
        if self.institution.id.trim().is_empty() {
            issues.push("reporting institution id is missing".to_string());
        }
        if self.subject.name.trim().is_empty() {
            issues.push("subject name is missing".to_string());
        }
        if self.narrative_description.trim().is_empty() {
            issues.push("activity description is missing".to_string());
        }
        if !self.total_amount_involved.is_finite() || self.total_amount_involved <= 0.0 {
            issues.push(format!(
                "total amount involved must be positive, got {}",
                self.total_amount_involved
            ));
        } else if self.report_type == ReportType::Ctr && self.total_amount_involved <= CTR_THRESHOLD {
            issues.push(format!(
                "CTR amount must exceed {CTR_THRESHOLD}, got {}",
                self.total_amount_involved
            ));
        }
        issues
    }

    pub fn ensure_valid(&self) -> AmlResult<()> {
        let issues = self.validate();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(AmlError::Validation(format!(
                "report '{}' is incomplete: {}",
                self.id,
                issues.join("; ")
            )))
        }
    }

    pub fn apply(&mut self, action: &ReportAction, at: Timestamp) -> AmlResult<()> {
        match action {
            ReportAction::SignOff { role, reviewer } => self.sign_off(*role, reviewer, at),
            ReportAction::SubmitForReview => self.submit_for_review(at),
            ReportAction::Acknowledge => self.acknowledge(at),
            ReportAction::Reject { reason } => self.reject(reason, at),
            ReportAction::Withdraw => self.withdraw(at),
        }
    }

    pub fn sign_off(&mut self, role: ReviewRole, reviewer: &str, at: Timestamp) -> AmlResult<()> {
        if !self.status.is_unfiled() {
            return Err(self.illegal("sign_off"));
        }
        if reviewer.trim().is_empty() {
            return Err(AmlError::Validation("reviewer is required".into()));
        }
        *self.reviews.slot_mut(role) = Some(SignOff { reviewer: reviewer.to_string(), signed_at: at });
        self.updated_at = at;
        Ok(())
    }

    pub fn submit_for_review(&mut self, at: Timestamp) -> AmlResult<()> {
        if self.status != ReportStatus::Draft {
            return Err(self.illegal("submit_for_review"));
        }
        self.status = ReportStatus::PendingReview;
        self.updated_at = at;
        Ok(())
    }

    /// Guard for handing the report to the regulator. Does not mutate.
    pub fn check_submittable(&self) -> AmlResult<()> {
        if self.status != ReportStatus::PendingReview {
            return Err(self.illegal("submit"));
        }
        self.ensure_valid()
    }

    pub fn mark_submitted(&mut self, receipt: &SubmissionReceipt, at: Timestamp) -> AmlResult<()> {
        self.check_submittable()?;
        self.status = ReportStatus::Submitted;
        self.filing_date = Some(at);
        self.submission_id = Some(receipt.submission_id.clone());
        self.acknowledgment_number = Some(receipt.acknowledgment_number.clone());
        self.updated_at = at;
        Ok(())
    }

    pub fn acknowledge(&mut self, at: Timestamp) -> AmlResult<()> {
        if self.status != ReportStatus::Submitted {
            return Err(self.illegal("acknowledge"));
        }
        self.status = ReportStatus::Acknowledged;
        self.updated_at = at;
        Ok(())
    }

    pub fn reject(&mut self, reason: &str, at: Timestamp) -> AmlResult<()> {
        if self.status != ReportStatus::Submitted {
            return Err(self.illegal("reject"));
        }
        self.status = ReportStatus::Rejected;
        self.rejection_reason = Some(reason.to_string());
        self.updated_at = at;
        Ok(())
    }

    pub fn withdraw(&mut self, at: Timestamp) -> AmlResult<()> {
        if !self.status.is_unfiled() {
            return Err(self.illegal("withdraw"));
        }
        self.status = ReportStatus::Withdrawn;
        self.updated_at = at;
        Ok(())
    }

    pub fn mark_amended(&mut self, amended_by: &str, at: Timestamp) -> AmlResult<()> {
        if !matches!(
            self.status,
            ReportStatus::Submitted | ReportStatus::Acknowledged | ReportStatus::Rejected
        ) {
            return Err(self.illegal("amend"));
        }
        self.status = ReportStatus::Amended;
        self.amended_by = Some(amended_by.to_string());
        self.updated_at = at;
        Ok(())
    }

    fn illegal(&self, action: &'static str) -> AmlError {
        AmlError::IllegalTransition {
            kind: "report",
            id: self.id.clone(),
            from: self.status.to_string(),
            action,
        }
    }
}
