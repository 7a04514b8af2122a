//! SQLite-backed store.
//!
//! Each record is kept as a JSON payload next to the handful of columns
//! the queries filter and sort on. Timestamps are stored as fixed-width
//! RFC 3339 text so that text order is time order.

use super::{AlertUpdate, AmlStore, ReportUpdate};
use crate::{
    alert::Alert,
    error::{AmlError, AmlResult},
    event::EventLogEntry,
    profile::RiskProfile,
    report::RegulatoryReport,
    types::Timestamp,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Mutex, MutexGuard};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn ts(at: &Timestamp) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<Timestamp> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn decode_all<T: serde::de::DeserializeOwned>(payloads: Vec<String>) -> AmlResult<Vec<T>> {
    payloads
        .iter()
        .map(|p| serde_json::from_str(p).map_err(AmlError::from))
        .collect()
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply migrations.
    pub fn open(path: &str) -> AmlResult<Self> {
        let conn = Connection::open(path)?;
        // WAL is ignored by :memory: databases.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Self::init(conn)
    }

    /// Open an isolated in-memory database (used in tests).
    pub fn in_memory() -> AmlResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> AmlResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// Apply all schema migrations in order. Safe to repeat.
    pub fn migrate(&self) -> AmlResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        conn.execute_batch(include_str!("../../../migrations/002_profiles_alerts.sql"))?;
        conn.execute_batch(include_str!("../../../migrations/003_reports.sql"))?;
        Ok(())
    }

    fn conn(&self) -> AmlResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| AmlError::LockPoisoned("sqlite connection"))
    }

    fn payloads(&self, sql: &str, key: Option<&str>) -> AmlResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = match key {
            Some(key) => stmt
                .query_map(params![key], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }
}

impl AmlStore for SqliteStore {
    // ── Risk profiles ─────────────────────────────────────────

    fn load_profile(&self, entity_id: &str) -> AmlResult<Option<RiskProfile>> {
        let payload: Option<String> = self
            .conn()?
            .query_row(
                "SELECT payload FROM risk_profile WHERE entity_id = ?1",
                params![entity_id],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(AmlError::from))
            .transpose()
    }

    fn save_profile(&self, profile: &RiskProfile) -> AmlResult<()> {
        let payload = serde_json::to_string(profile)?;
        self.conn()?.execute(
            "INSERT INTO risk_profile
             (entity_id, risk_level, overall_risk_score, next_review_date, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(entity_id) DO UPDATE SET
                 risk_level = excluded.risk_level,
                 overall_risk_score = excluded.overall_risk_score,
                 next_review_date = excluded.next_review_date,
                 payload = excluded.payload",
            params![
                profile.entity_id(),
                profile.risk_level.as_str(),
                profile.overall_risk_score,
                ts(&profile.next_review_date),
                payload,
            ],
        )?;
        Ok(())
    }

    fn list_profiles(&self) -> AmlResult<Vec<RiskProfile>> {
        decode_all(self.payloads("SELECT payload FROM risk_profile ORDER BY entity_id", None)?)
    }

    // ── Alerts ────────────────────────────────────────────────

    fn insert_alert(&self, alert: &Alert) -> AmlResult<()> {
        let payload = serde_json::to_string(alert)?;
        let inserted = self.conn()?.execute(
            "INSERT OR IGNORE INTO alert
             (alert_id, entity_id, status, priority, created_at, due_date, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                alert.id,
                alert.entity_id,
                alert.status.as_str(),
                alert.priority.as_str(),
                ts(&alert.created_at),
                ts(&alert.due_date),
                payload,
            ],
        )?;
        if inserted == 0 {
            return Err(AmlError::DuplicateId { kind: "alert", id: alert.id.clone() });
        }
        Ok(())
    }

    fn get_alert(&self, alert_id: &str) -> AmlResult<Alert> {
        let payload: Option<String> = self
            .conn()?
            .query_row(
                "SELECT payload FROM alert WHERE alert_id = ?1",
                params![alert_id],
                |row| row.get(0),
            )
            .optional()?;
        let payload = payload.ok_or_else(|| AmlError::NotFound { kind: "alert", id: alert_id.to_string() })?;
        Ok(serde_json::from_str(&payload)?)
    }

    fn alerts_for_entity(&self, entity_id: &str) -> AmlResult<Vec<Alert>> {
        decode_all(self.payloads(
            "SELECT payload FROM alert WHERE entity_id = ?1 ORDER BY created_at, alert_id",
            Some(entity_id),
        )?)
    }

    fn list_alerts(&self) -> AmlResult<Vec<Alert>> {
        decode_all(self.payloads("SELECT payload FROM alert ORDER BY created_at, alert_id", None)?)
    }

    fn update_alert(&self, alert_id: &str, apply: AlertUpdate<'_>) -> AmlResult<Alert> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let payload: Option<String> = tx
            .query_row(
                "SELECT payload FROM alert WHERE alert_id = ?1",
                params![alert_id],
                |row| row.get(0),
            )
            .optional()?;
        let payload = payload.ok_or_else(|| AmlError::NotFound { kind: "alert", id: alert_id.to_string() })?;
        let mut alert: Alert = serde_json::from_str(&payload)?;

        // Dropping `tx` on error rolls back.
        apply(&mut alert)?;

        tx.execute(
            "UPDATE alert SET status = ?1, priority = ?2, payload = ?3 WHERE alert_id = ?4",
            params![
                alert.status.as_str(),
                alert.priority.as_str(),
                serde_json::to_string(&alert)?,
                alert_id,
            ],
        )?;
        tx.commit()?;
        Ok(alert)
    }

    // ── Regulatory reports ────────────────────────────────────

    fn insert_report(&self, report: &RegulatoryReport) -> AmlResult<()> {
        let payload = serde_json::to_string(report)?;
        let inserted = self.conn()?.execute(
            "INSERT OR IGNORE INTO regulatory_report
             (report_id, alert_id, entity_id, report_type, status, created_at, filing_deadline, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                report.id,
                report.alert_id,
                report.entity_id,
                report.report_type.as_str(),
                report.status.as_str(),
                ts(&report.created_at),
                ts(&report.filing_deadline),
                payload,
            ],
        )?;
        if inserted == 0 {
            return Err(AmlError::DuplicateId { kind: "report", id: report.id.clone() });
        }
        Ok(())
    }

    fn get_report(&self, report_id: &str) -> AmlResult<RegulatoryReport> {
        let payload: Option<String> = self
            .conn()?
            .query_row(
                "SELECT payload FROM regulatory_report WHERE report_id = ?1",
                params![report_id],
                |row| row.get(0),
            )
            .optional()?;
        let payload = payload.ok_or_else(|| AmlError::NotFound { kind: "report", id: report_id.to_string() })?;
        Ok(serde_json::from_str(&payload)?)
    }

    fn reports_for_alert(&self, alert_id: &str) -> AmlResult<Vec<RegulatoryReport>> {
        decode_all(self.payloads(
            "SELECT payload FROM regulatory_report WHERE alert_id = ?1 ORDER BY created_at, report_id",
            Some(alert_id),
        )?)
    }

    fn list_reports(&self) -> AmlResult<Vec<RegulatoryReport>> {
        decode_all(self.payloads(
            "SELECT payload FROM regulatory_report ORDER BY created_at, report_id",
            None,
        )?)
    }

    fn update_report(&self, report_id: &str, apply: ReportUpdate<'_>) -> AmlResult<RegulatoryReport> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let payload: Option<String> = tx
            .query_row(
                "SELECT payload FROM regulatory_report WHERE report_id = ?1",
                params![report_id],
                |row| row.get(0),
            )
            .optional()?;
        let payload = payload.ok_or_else(|| AmlError::NotFound { kind: "report", id: report_id.to_string() })?;
        let mut report: RegulatoryReport = serde_json::from_str(&payload)?;

        apply(&mut report)?;

        tx.execute(
            "UPDATE regulatory_report SET status = ?1, payload = ?2 WHERE report_id = ?3",
            params![report.status.as_str(), serde_json::to_string(&report)?, report_id],
        )?;
        tx.commit()?;
        Ok(report)
    }

    // ── Event log ─────────────────────────────────────────────

    fn append_event(&self, entry: &EventLogEntry) -> AmlResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO event_log (entity_id, event_type, recorded_at, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![entry.entity_id, entry.event_type, ts(&entry.recorded_at), entry.payload],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn events_for_entity(&self, entity_id: &str) -> AmlResult<Vec<EventLogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, entity_id, event_type, recorded_at, payload
             FROM event_log WHERE entity_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![entity_id], |row| {
                let recorded_at: String = row.get(3)?;
                Ok(EventLogEntry {
                    id:          Some(row.get(0)?),
                    entity_id:   row.get(1)?,
                    event_type:  row.get(2)?,
                    recorded_at: parse_ts(3, &recorded_at)?,
                    payload:     row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        store.migrate().unwrap();
        assert!(store.list_alerts().unwrap().is_empty());
    }

    #[test]
    fn timestamps_sort_as_text() {
        use chrono::TimeZone;
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let b = a + chrono::Duration::milliseconds(250);
        assert!(ts(&a) < ts(&b));
        assert_eq!(parse_ts(0, &ts(&b)).unwrap(), b);
    }
}
