//! In-process store backed by mutex-guarded maps. Used by tests and by
//! the runner when no database path is given.

use super::{AlertUpdate, AmlStore, ReportUpdate};
use crate::{
    alert::Alert,
    error::{AmlError, AmlResult},
    event::EventLogEntry,
    profile::RiskProfile,
    report::RegulatoryReport,
    types::{AlertId, EntityId, ReportId},
};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

#[derive(Default)]
struct Tables {
    profiles: HashMap<EntityId, RiskProfile>,
    alerts: HashMap<AlertId, Alert>,
    reports: HashMap<ReportId, RegulatoryReport>,
    events: Vec<EventLogEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AmlResult<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| AmlError::LockPoisoned("memory store"))
    }
}

fn oldest_first_alerts(mut alerts: Vec<Alert>) -> Vec<Alert> {
    alerts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    alerts
}

fn oldest_first_reports(mut reports: Vec<RegulatoryReport>) -> Vec<RegulatoryReport> {
    reports.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    reports
}

impl AmlStore for MemoryStore {
    fn load_profile(&self, entity_id: &str) -> AmlResult<Option<RiskProfile>> {
        Ok(self.lock()?.profiles.get(entity_id).cloned())
    }

    fn save_profile(&self, profile: &RiskProfile) -> AmlResult<()> {
        self.lock()?
            .profiles
            .insert(profile.entity_id().to_string(), profile.clone());
        Ok(())
    }

    fn list_profiles(&self) -> AmlResult<Vec<RiskProfile>> {
        let mut profiles: Vec<_> = self.lock()?.profiles.values().cloned().collect();
        profiles.sort_by(|a, b| a.entity_id().cmp(b.entity_id()));
        Ok(profiles)
    }

    fn insert_alert(&self, alert: &Alert) -> AmlResult<()> {
        let mut tables = self.lock()?;
        if tables.alerts.contains_key(&alert.id) {
            return Err(AmlError::DuplicateId { kind: "alert", id: alert.id.clone() });
        }
        tables.alerts.insert(alert.id.clone(), alert.clone());
        Ok(())
    }

    fn get_alert(&self, alert_id: &str) -> AmlResult<Alert> {
        self.lock()?
            .alerts
            .get(alert_id)
            .cloned()
            .ok_or_else(|| AmlError::NotFound { kind: "alert", id: alert_id.to_string() })
    }

    fn alerts_for_entity(&self, entity_id: &str) -> AmlResult<Vec<Alert>> {
        let alerts = self
            .lock()?
            .alerts
            .values()
            .filter(|a| a.entity_id == entity_id)
            .cloned()
            .collect();
        Ok(oldest_first_alerts(alerts))
    }

    fn list_alerts(&self) -> AmlResult<Vec<Alert>> {
        let alerts = self.lock()?.alerts.values().cloned().collect();
        Ok(oldest_first_alerts(alerts))
    }

    fn update_alert(&self, alert_id: &str, apply: AlertUpdate<'_>) -> AmlResult<Alert> {
        let mut tables = self.lock()?;
        let current = tables
            .alerts
            .get(alert_id)
            .ok_or_else(|| AmlError::NotFound { kind: "alert", id: alert_id.to_string() })?;
        let mut next = current.clone();
        apply(&mut next)?;
        tables.alerts.insert(alert_id.to_string(), next.clone());
        Ok(next)
    }

    fn insert_report(&self, report: &RegulatoryReport) -> AmlResult<()> {
        let mut tables = self.lock()?;
        if tables.reports.contains_key(&report.id) {
            return Err(AmlError::DuplicateId { kind: "report", id: report.id.clone() });
        }
        tables.reports.insert(report.id.clone(), report.clone());
        Ok(())
    }

    fn get_report(&self, report_id: &str) -> AmlResult<RegulatoryReport> {
        self.lock()?
            .reports
            .get(report_id)
            .cloned()
            .ok_or_else(|| AmlError::NotFound { kind: "report", id: report_id.to_string() })
    }

    fn reports_for_alert(&self, alert_id: &str) -> AmlResult<Vec<RegulatoryReport>> {
        let reports = self
            .lock()?
            .reports
            .values()
            .filter(|r| r.alert_id == alert_id)
            .cloned()
            .collect();
        Ok(oldest_first_reports(reports))
    }

    fn list_reports(&self) -> AmlResult<Vec<RegulatoryReport>> {
        let reports = self.lock()?.reports.values().cloned().collect();
        Ok(oldest_first_reports(reports))
    }

    fn update_report(&self, report_id: &str, apply: ReportUpdate<'_>) -> AmlResult<RegulatoryReport> {
        let mut tables = self.lock()?;
        let current = tables
            .reports
            .get(report_id)
            .ok_or_else(|| AmlError::NotFound { kind: "report", id: report_id.to_string() })?;
        let mut next = current.clone();
        apply(&mut next)?;
        tables.reports.insert(report_id.to_string(), next.clone());
        Ok(next)
    }

    fn append_event(&self, entry: &EventLogEntry) -> AmlResult<i64> {
        let mut tables = self.lock()?;
        let id = tables.events.len() as i64 + 1;
        tables.events.push(EventLogEntry { id: Some(id), ..entry.clone() });
        Ok(id)
    }

    fn events_for_entity(&self, entity_id: &str) -> AmlResult<Vec<EventLogEntry>> {
        Ok(self
            .lock()?
            .events
            .iter()
            .filter(|e| e.entity_id == entity_id)
            .cloned()
            .collect())
    }
}
