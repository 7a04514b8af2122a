//! Shared primitive types used across the engine.

use chrono::{DateTime, Utc};

/// Instant at which an assessment or transition happens. Always UTC.
pub type Timestamp = DateTime<Utc>;

/// Stable identifier of a screened entity (customer or business).
pub type EntityId = String;

/// Generated identifier of an alert.
pub type AlertId = String;

/// Generated identifier of a regulatory report.
pub type ReportId = String;
