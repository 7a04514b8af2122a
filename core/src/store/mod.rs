//! Persistence contract.
//!
//! RULE: Only the store talks to storage. Engine components hand records
//! to an `AmlStore` and never keep their own copies between calls.
//!
//! `update_alert` / `update_report` are the only way to change a stored
//! alert or report. The closure runs under the store's lock (or inside a
//! SQLite transaction) against the current record; if it returns an error
//! nothing is written.

use crate::{
    alert::Alert,
    error::AmlResult,
    event::EventLogEntry,
    profile::RiskProfile,
    report::RegulatoryReport,
};

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub type AlertUpdate<'a> = &'a mut dyn FnMut(&mut Alert) -> AmlResult<()>;
pub type ReportUpdate<'a> = &'a mut dyn FnMut(&mut RegulatoryReport) -> AmlResult<()>;

pub trait AmlStore: Send + Sync {
    // ── Risk profiles ─────────────────────────────────────────

    fn load_profile(&self, entity_id: &str) -> AmlResult<Option<RiskProfile>>;

    /// Insert or replace the profile for its entity.
    fn save_profile(&self, profile: &RiskProfile) -> AmlResult<()>;

    fn list_profiles(&self) -> AmlResult<Vec<RiskProfile>>;

    // ── Alerts ────────────────────────────────────────────────

    /// Fails with `DuplicateId` if the id is already stored.
    fn insert_alert(&self, alert: &Alert) -> AmlResult<()>;

    /// Fails with `NotFound` for an unknown id.
    fn get_alert(&self, alert_id: &str) -> AmlResult<Alert>;

    /// Oldest first.
    fn alerts_for_entity(&self, entity_id: &str) -> AmlResult<Vec<Alert>>;

    /// Oldest first.
    fn list_alerts(&self) -> AmlResult<Vec<Alert>>;

    /// Atomic read-check-write. Returns the record as written.
    fn update_alert(&self, alert_id: &str, apply: AlertUpdate<'_>) -> AmlResult<Alert>;

    // ── Regulatory reports ────────────────────────────────────

    fn insert_report(&self, report: &RegulatoryReport) -> AmlResult<()>;

    fn get_report(&self, report_id: &str) -> AmlResult<RegulatoryReport>;

    fn reports_for_alert(&self, alert_id: &str) -> AmlResult<Vec<RegulatoryReport>>;

    fn list_reports(&self) -> AmlResult<Vec<RegulatoryReport>>;

    fn update_report(&self, report_id: &str, apply: ReportUpdate<'_>) -> AmlResult<RegulatoryReport>;

    // ── Event log ─────────────────────────────────────────────

    /// Returns the id assigned to the entry.
    fn append_event(&self, entry: &EventLogEntry) -> AmlResult<i64>;

    /// In append order.
    fn events_for_entity(&self, entity_id: &str) -> AmlResult<Vec<EventLogEntry>>;
}

#[cfg(test)]
mod tests {
    //! Behaviour both backends must share.

    use super::*;
    use crate::{
        alert::{AlertStatus, AlertType, NewAlert},
        error::AmlError,
        event::AmlEvent,
        report::{ReportDraft, ReportType, ReportingInstitution},
    };
    use chrono::{Duration, TimeZone, Utc};

    fn backends() -> Vec<(&'static str, Box<dyn AmlStore>)> {
        vec![
            ("memory", Box::new(MemoryStore::new())),
            ("sqlite", Box::new(SqliteStore::in_memory().unwrap())),
        ]
    }

    fn alert(entity: &str, minutes: i64) -> Alert {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes);
        Alert::raise(
            NewAlert {
                entity_id: entity.into(),
                alert_type: AlertType::HighRiskScore,
                risk_score: 75.0,
                severity: None,
                description: "score crossed threshold".into(),
            },
            created,
        )
        .unwrap()
    }

    #[test]
    fn alert_insert_get_and_duplicate() {
        for (name, store) in backends() {
            let a = alert("e-1", 0);
            store.insert_alert(&a).unwrap();
            assert_eq!(store.get_alert(&a.id).unwrap(), a, "{name}");
            assert!(
                matches!(store.insert_alert(&a), Err(AmlError::DuplicateId { .. })),
                "{name}: duplicate insert must fail"
            );
            assert!(matches!(store.get_alert("alert-missing"), Err(AmlError::NotFound { .. })));
        }
    }

    #[test]
    fn alerts_listed_oldest_first_per_entity() {
        for (name, store) in backends() {
            let late = alert("e-1", 30);
            let early = alert("e-1", 5);
            let other = alert("e-2", 0);
            for a in [&late, &early, &other] {
                store.insert_alert(a).unwrap();
            }
            let ids: Vec<_> = store.alerts_for_entity("e-1").unwrap().into_iter().map(|a| a.id).collect();
            assert_eq!(ids, vec![early.id.clone(), late.id.clone()], "{name}");
            assert_eq!(store.list_alerts().unwrap().len(), 3, "{name}");
        }
    }

    #[test]
    fn failed_update_writes_nothing() {
        for (name, store) in backends() {
            let a = alert("e-1", 0);
            store.insert_alert(&a).unwrap();
            let at = a.created_at;

            let err = store
                .update_alert(&a.id, &mut |alert| alert.start_investigation("inv", at))
                .unwrap_err();
            assert!(matches!(err, AmlError::IllegalTransition { .. }), "{name}");
            assert_eq!(store.get_alert(&a.id).unwrap(), a, "{name}");

            let written = store.update_alert(&a.id, &mut |alert| alert.assign("analyst", at)).unwrap();
            assert_eq!(written.status, AlertStatus::InReview, "{name}");
            assert_eq!(store.get_alert(&a.id).unwrap(), written, "{name}");
        }
    }

    #[test]
    fn reports_round_trip_through_update() {
        for (name, store) in backends() {
            let a = alert("e-1", 0);
            let report = RegulatoryReport::draft(
                &a,
                ReportDraft {
                    report_type: ReportType::Sar,
                    subject_name: "Acme Ltd".into(),
                    subject_type: None,
                    subject_country: None,
                    narrative_description: "layering through shell accounts".into(),
                    total_amount_involved: 250_000.0,
                },
                ReportingInstitution { name: "Bank".into(), id: "B-1".into() },
                a.created_at,
                30,
            );
            store.insert_alert(&a).unwrap();
            store.insert_report(&report).unwrap();
            let updated = store
                .update_report(&report.id, &mut |r| r.submit_for_review(a.created_at))
                .unwrap();
            assert_eq!(store.get_report(&report.id).unwrap(), updated, "{name}");
            assert_eq!(store.reports_for_alert(&a.id).unwrap().len(), 1, "{name}");
            assert!(matches!(
                store.update_report("report-missing", &mut |_| Ok(())),
                Err(AmlError::NotFound { .. })
            ));
        }
    }

    #[test]
    fn events_kept_in_append_order() {
        for (name, store) in backends() {
            let a = alert("e-1", 0);
            let created = AmlEvent::AlertCreated {
                at: a.created_at,
                alert_id: a.id.clone(),
                entity_id: a.entity_id.clone(),
                alert_type: a.alert_type,
                severity: a.severity,
                priority: a.priority,
                due_date: a.due_date,
            };
            let moved = AmlEvent::AlertTransitioned {
                at: a.created_at,
                alert_id: a.id.clone(),
                entity_id: a.entity_id.clone(),
                action: "assign".into(),
                from: AlertStatus::New,
                to: AlertStatus::InReview,
            };
            let first = store.append_event(&EventLogEntry::from_event(&created).unwrap()).unwrap();
            let second = store.append_event(&EventLogEntry::from_event(&moved).unwrap()).unwrap();
            assert!(second > first, "{name}");

            let events = store.events_for_entity("e-1").unwrap();
            let types: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
            assert_eq!(types, vec!["alert_created", "alert_transitioned"], "{name}");
            assert_eq!(events[1].decode().unwrap(), moved, "{name}");
            assert!(store.events_for_entity("e-2").unwrap().is_empty());
        }
    }
}
