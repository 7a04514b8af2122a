//! SAR/CTR drafting, filing and compliance scoring.

use crate::{
    alert::Alert,
    command::ReportAction,
    config::{RegulatorConfig, ReportingConfig},
    error::{AmlError, AmlResult},
    regulator::{RegulatorSubmit, SubmissionReceipt},
    report::{RegulatoryReport, ReportDraft, ReportStatus, ReportingInstitution},
    store::AmlStore,
    types::Timestamp,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ── Constants ────────────────────────────────────────────────────────────────

/// Submission turnaround at which timeliness reaches zero.
const TIMELINESS_HORIZON_HOURS: f64 = 168.0;

const W_TIMELINESS: f64 = 0.4;
const W_ACCURACY: f64 = 0.3;
const W_COMPLETENESS: f64 = 0.3;

/// Period-level reporting quality. Each component is in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplianceScore {
    pub timeliness: f64,
    pub accuracy: f64,
    pub completeness: f64,
    pub overall: f64,
    pub total_reports: usize,
    pub submitted_reports: usize,
    pub rejected_reports: usize,
    pub late_filings: usize,
}

/// Half-open interval `[start, end)` on report creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingPeriod {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl ReportingPeriod {
    pub fn contains(&self, at: Timestamp) -> bool {
        at >= self.start && at < self.end
    }
}

/// A report the regulator accepted.
#[derive(Debug, Clone)]
pub struct Filing {
    pub receipt: SubmissionReceipt,
    pub report: RegulatoryReport,
}

/// Result of a stored report transition.
#[derive(Debug, Clone)]
pub struct ReportTransition {
    pub from: ReportStatus,
    pub report: RegulatoryReport,
}

pub struct ReportWorkflow {
    reporting: ReportingConfig,
    regulator: Arc<dyn RegulatorSubmit>,
    timeout: std::time::Duration,
}

impl ReportWorkflow {
    pub fn new(
        reporting: ReportingConfig,
        regulator: Arc<dyn RegulatorSubmit>,
        regulator_config: &RegulatorConfig,
    ) -> Self {
        Self { reporting, regulator, timeout: regulator_config.timeout() }
    }

    pub fn institution(&self) -> ReportingInstitution {
        ReportingInstitution {
            name: self.reporting.institution_name.clone(),
            id: self.reporting.institution_id.clone(),
        }
    }

    /// New DRAFT for a closed or escalated alert.
    pub fn draft(&self, alert: &Alert, draft: ReportDraft, now: Timestamp) -> AmlResult<RegulatoryReport> {
        if !alert.status.is_reportable() {
            return Err(AmlError::IllegalTransition {
                kind: "alert",
                id: alert.id.clone(),
                from: alert.status.to_string(),
                action: "draft_report",
            });
        }
        Ok(RegulatoryReport::draft(
            alert,
            draft,
            self.institution(),
            now,
            self.reporting.filing_deadline_days,
        ))
    }

    pub fn transition(
        &self,
        store: &dyn AmlStore,
        report_id: &str,
        action: &ReportAction,
        now: Timestamp,
    ) -> AmlResult<ReportTransition> {
        let mut from = None;
        let report = store.update_report(report_id, &mut |report| {
            from = Some(report.status);
            report.apply(action, now)
        })?;
        Ok(ReportTransition { from: from.unwrap_or(report.status), report })
    }

    /// Supersede a filed report. The original moves to AMENDED and a new
    /// DRAFT referencing it is stored and returned.
    pub fn amend(&self, store: &dyn AmlStore, report_id: &str, now: Timestamp) -> AmlResult<RegulatoryReport> {
        let original = store.get_report(report_id)?;
        let amendment = original.amendment(now, self.reporting.filing_deadline_days);
        // Guard first, then store the amendment before the original is marked.
        original.clone().mark_amended(&amendment.id, now)?;
        store.insert_report(&amendment)?;
        store.update_report(report_id, &mut |report| report.mark_amended(&amendment.id, now))?;
        Ok(amendment)
    }

    /// File a PENDING_REVIEW report with the regulator.
    ///
    /// Guards are checked before the call goes out. A failed or timed-out
    /// call returns a retryable `Regulator` error and the report stays in
    /// PENDING_REVIEW.
    pub async fn submit(&self, store: &dyn AmlStore, report_id: &str, now: Timestamp) -> AmlResult<Filing> {
        let report = store.get_report(report_id)?;
        report.check_submittable()?;

        let receipt = match tokio::time::timeout(self.timeout, self.regulator.submit(&report)).await {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => {
                return Err(AmlError::Regulator { report_id: report_id.to_string(), reason: e.to_string() });
            }
            Err(_) => {
                return Err(AmlError::Regulator {
                    report_id: report_id.to_string(),
                    reason: format!("timed out after {:?}", self.timeout),
                });
            }
        };

        let report = store.update_report(report_id, &mut |r| r.mark_submitted(&receipt, now))?;
        Ok(Filing { receipt, report })
    }
}

/// Weighted timeliness, accuracy and completeness over `reports`.
pub fn compliance_score(reports: &[RegulatoryReport]) -> ComplianceScore {
    let total = reports.len();

    let turnaround_hours: Vec<f64> = reports
        .iter()
        .filter_map(|r| r.filing_date.map(|filed| (filed - r.created_at).num_seconds() as f64 / 3600.0))
        .collect();
    let timeliness = if turnaround_hours.is_empty() {
        1.0
    } else {
        let avg = turnaround_hours.iter().sum::<f64>() / turnaround_hours.len() as f64;
        ((TIMELINESS_HORIZON_HOURS - avg) / TIMELINESS_HORIZON_HOURS).clamp(0.0, 1.0)
    };

    let rejected = reports.iter().filter(|r| r.rejection_reason.is_some()).count();
    let complete = reports.iter().filter(|r| r.validate().is_empty()).count();
    let (accuracy, completeness) = if total == 0 {
        (1.0, 1.0)
    } else {
        (1.0 - rejected as f64 / total as f64, complete as f64 / total as f64)
    };

    ComplianceScore {
        timeliness,
        accuracy,
        completeness,
        overall: W_TIMELINESS * timeliness + W_ACCURACY * accuracy + W_COMPLETENESS * completeness,
        total_reports: total,
        submitted_reports: turnaround_hours.len(),
        rejected_reports: rejected,
        late_filings: reports.iter().filter(|r| r.late_filing()).count(),
    }
}

/// Unfiled reports whose deadline falls within `hours` of `now`, including
/// any already past due. Soonest deadline first.
pub fn reports_due_within(reports: Vec<RegulatoryReport>, now: Timestamp, hours: i64) -> Vec<RegulatoryReport> {
    let horizon = now + Duration::hours(hours);
    let mut due: Vec<RegulatoryReport> = reports
        .into_iter()
        .filter(|r| r.status.is_unfiled() && r.filing_deadline <= horizon)
        .collect();
    due.sort_by(|a, b| a.filing_deadline.cmp(&b.filing_deadline));
    due
}
