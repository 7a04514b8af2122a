//! Audit trail of everything the engine decides.
//!
//! RULE: every state change the engine makes is appended to the event log
//! as one `AmlEvent`. Events are never updated or deleted.

use crate::{
    aggregator::RiskLevel,
    alert::{AlertStatus, AlertType, Priority, Severity},
    report::{ReportStatus, ReportType},
    types::{AlertId, EntityId, ReportId, Timestamp},
};
use serde::{Deserialize, Serialize};

/// Variants are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AmlEvent {
    // ── Assessment ─────────────────────────────────
    RiskAssessed {
        at: Timestamp,
        entity_id: EntityId,
        overall_risk_score: f64,
        risk_level: RiskLevel,
        model_version: String,
        anomaly: bool,
    },

    // ── Alerts ─────────────────────────────────────
    AlertCreated {
        at: Timestamp,
        alert_id: AlertId,
        entity_id: EntityId,
        alert_type: AlertType,
        severity: Severity,
        priority: Priority,
        due_date: Timestamp,
    },
    AlertTransitioned {
        at: Timestamp,
        alert_id: AlertId,
        entity_id: EntityId,
        action: String,
        from: AlertStatus,
        to: AlertStatus,
    },

    // ── Reports ────────────────────────────────────
    ReportDrafted {
        at: Timestamp,
        report_id: ReportId,
        alert_id: AlertId,
        entity_id: EntityId,
        report_type: ReportType,
        filing_deadline: Timestamp,
    },
    ReportStatusChanged {
        at: Timestamp,
        report_id: ReportId,
        entity_id: EntityId,
        action: String,
        from: ReportStatus,
        to: ReportStatus,
    },
    ReportSubmitted {
        at: Timestamp,
        report_id: ReportId,
        entity_id: EntityId,
        submission_id: String,
        acknowledgment_number: String,
        late_filing: bool,
    },
    ReportSubmissionFailed {
        at: Timestamp,
        report_id: ReportId,
        entity_id: EntityId,
        reason: String,
    },
}

impl AmlEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RiskAssessed { .. } => "risk_assessed",
            Self::AlertCreated { .. } => "alert_created",
            Self::AlertTransitioned { .. } => "alert_transitioned",
            Self::ReportDrafted { .. } => "report_drafted",
            Self::ReportStatusChanged { .. } => "report_status_changed",
            Self::ReportSubmitted { .. } => "report_submitted",
            Self::ReportSubmissionFailed { .. } => "report_submission_failed",
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            Self::RiskAssessed { entity_id, .. }
            | Self::AlertCreated { entity_id, .. }
            | Self::AlertTransitioned { entity_id, .. }
            | Self::ReportDrafted { entity_id, .. }
            | Self::ReportStatusChanged { entity_id, .. }
            | Self::ReportSubmitted { entity_id, .. }
            | Self::ReportSubmissionFailed { entity_id, .. } => entity_id,
        }
    }

    pub fn at(&self) -> Timestamp {
        match self {
            Self::RiskAssessed { at, .. }
            | Self::AlertCreated { at, .. }
            | Self::AlertTransitioned { at, .. }
            | Self::ReportDrafted { at, .. }
            | Self::ReportStatusChanged { at, .. }
            | Self::ReportSubmitted { at, .. }
            | Self::ReportSubmissionFailed { at, .. } => *at,
        }
    }
}

/// Row in the event log.
#[derive(Debug, Clone, PartialEq)]
pub struct EventLogEntry {
    /// Assigned by the store on append.
    pub id: Option<i64>,
    pub entity_id: EntityId,
    pub event_type: String,
    pub recorded_at: Timestamp,
    pub payload: String, // JSON-serialized AmlEvent
}

impl EventLogEntry {
    pub fn from_event(event: &AmlEvent) -> serde_json::Result<Self> {
        Ok(Self {
            id: None,
            entity_id: event.entity_id().to_string(),
            event_type: event.event_type().to_string(),
            recorded_at: event.at(),
            payload: serde_json::to_string(event)?,
        })
    }

    pub fn decode(&self) -> serde_json::Result<AmlEvent> {
        serde_json::from_str(&self.payload)
    }
}
