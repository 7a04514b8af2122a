//! Engine configuration.
//!
//! Scoring weights and thresholds are constants in the modules that use
//! them. This file holds the operational knobs: reference lists, the
//! outbound collaborator switches and their timeouts, and reporting rules.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ── Reference lists ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JurisdictionLists {
    /// ISO country codes on the FATF black list or comprehensively sanctioned.
    pub high_risk: Vec<String>,
    /// ISO country codes under increased monitoring (FATF grey list).
    pub medium_risk: Vec<String>,
}

impl JurisdictionLists {
    pub fn is_high_risk(&self, code: &str) -> bool {
        contains_code(&self.high_risk, code)
    }

    pub fn is_medium_risk(&self, code: &str) -> bool {
        contains_code(&self.medium_risk, code)
    }
}

impl Default for JurisdictionLists {
    fn default() -> Self {
        Self {
            high_risk: codes(&["KP", "IR", "MM", "SY", "CU", "AF", "YE"]),
            medium_risk: codes(&[
                "PK", "NG", "ZA", "PH", "VN", "TZ", "HT", "JM", "ML", "MZ", "SN", "SS",
                "KE", "CM", "CD", "BF", "HR", "MC", "VE", "LB", "AE", "TR",
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndustryLists {
    pub high_risk: Vec<String>,
    pub medium_risk: Vec<String>,
}

impl IndustryLists {
    pub fn is_high_risk(&self, code: &str) -> bool {
        contains_code(&self.high_risk, code)
    }

    pub fn is_medium_risk(&self, code: &str) -> bool {
        contains_code(&self.medium_risk, code)
    }
}

impl Default for IndustryLists {
    fn default() -> Self {
        Self {
            high_risk: codes(&[
                "money_services",
                "gambling",
                "crypto",
                "precious_metals",
                "art_antiques",
            ]),
            medium_risk: codes(&[
                "real_estate",
                "luxury_goods",
                "import_export",
                "cash_intensive",
            ]),
        }
    }
}

// ── Outbound collaborators ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorConfig {
    /// When false the engine never calls out and uses the fallback directly.
    pub enabled: bool,
    pub timeout_ms: u64,
}

impl CollaboratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self { enabled: true, timeout_ms: 2_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegulatorConfig {
    pub timeout_ms: u64,
    /// Probability that the simulated regulator rejects a submission call.
    pub failure_rate: f64,
    /// Seed for the simulated regulator's failure stream.
    pub seed: u64,
}

impl RegulatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RegulatorConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000, failure_rate: 0.05, seed: 0x5A12_0001 }
    }
}

/// Statutory SAR/CTR filing window.
pub const STATUTORY_FILING_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Days between report creation and filing deadline. May be set below
    /// the statutory window as an internal target, never above it.
    pub filing_deadline_days: i64,
    /// Name of the reporting institution stamped on new drafts.
    pub institution_name: String,
    /// Regulator-issued identifier of the reporting institution.
    pub institution_id: String,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            filing_deadline_days: STATUTORY_FILING_DAYS,
            institution_name: String::new(),
            institution_id: String::new(),
        }
    }
}

impl ReportingConfig {
    /// Both halves of the institution identity stamped on drafts are set.
    pub fn has_institution(&self) -> bool {
        !self.institution_name.trim().is_empty() && !self.institution_id.trim().is_empty()
    }
}

// ── Root ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub jurisdictions: JurisdictionLists,
    #[serde(default)]
    pub industries: IndustryLists,
    #[serde(default)]
    pub ml: CollaboratorConfig,
    #[serde(default)]
    pub anomaly: CollaboratorConfig,
    #[serde(default)]
    pub regulator: RegulatorConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
}

impl EngineConfig {
    /// Load from a JSON file. Missing sections fall back to defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: EngineConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.regulator.failure_rate) {
            anyhow::bail!(
                "regulator.failure_rate must be in [0, 1], got {}",
                self.regulator.failure_rate
            );
        }
        if !(1..=STATUTORY_FILING_DAYS).contains(&self.reporting.filing_deadline_days) {
            anyhow::bail!(
                "reporting.filing_deadline_days must be in 1..={STATUTORY_FILING_DAYS}, got {}",
                self.reporting.filing_deadline_days
            );
        }
        Ok(())
    }

    /// Config for unit tests: no outbound calls, a regulator that never fails,
    /// and a populated institution identity.
    pub fn default_test() -> Self {
        Self {
            ml: CollaboratorConfig { enabled: false, timeout_ms: 200 },
            anomaly: CollaboratorConfig { enabled: false, timeout_ms: 200 },
            regulator: RegulatorConfig { timeout_ms: 500, failure_rate: 0.0, seed: 42 },
            reporting: ReportingConfig {
                filing_deadline_days: 30,
                institution_name: "Test Savings Bank".into(),
                institution_id: "TSB-0001".into(),
            },
            ..Self::default()
        }
    }
}

fn codes(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn contains_code(list: &[String], code: &str) -> bool {
    list.iter().any(|c| c.eq_ignore_ascii_case(code))
}
