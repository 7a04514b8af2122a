//! Risk factor calculator.
//!
//! Pure function of the assessment context: no I/O, no clock, no shared
//! state. Every sub-score is additive within its rule and clamped to [0, 1].
//! Country tiers come from the injected `GeoRisk` provider.

use crate::{
    config::IndustryLists,
    error::{AmlError, AmlResult},
    screening::{FatfStatus, GeoRisk},
    types::EntityId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ── Constants ────────────────────────────────────────────────────────────────

const ENTITY_HIGH_RISK_JURISDICTION: f64 = 0.8;
const ENTITY_MEDIUM_RISK_JURISDICTION: f64 = 0.4;
const LEG_HIGH_RISK_JURISDICTION: f64 = 0.6;
const LEG_MEDIUM_RISK_JURISDICTION: f64 = 0.3;
const CROSS_BORDER: f64 = 0.1;

const LARGE_DEVIATION: f64 = 0.4; // deviation > 2x baseline
const MODERATE_DEVIATION: f64 = 0.2; // deviation > 1x baseline
const ROUND_AMOUNT: f64 = 0.1;
const LARGE_AMOUNT_THRESHOLD: f64 = 10_000.0; // CTR threshold
const LARGE_AMOUNT: f64 = 0.2;

const SANCTIONS_HIT: f64 = 1.0;
const PEP_HIT: f64 = 0.8;
const ADVERSE_MEDIA_PER_ARTICLE: f64 = 0.1;

const INDUSTRY_HIGH: f64 = 0.8;
const INDUSTRY_MEDIUM: f64 = 0.5;
const INDUSTRY_UNKNOWN: f64 = 0.3;
const INDUSTRY_OTHER: f64 = 0.2;

const NEW_ACCOUNT_WEIGHT: f64 = 0.3;
const LOW_KYC_WEIGHT: f64 = 0.4;
const VIOLATION_WEIGHT: f64 = 0.2;
const VIOLATION_CAP: f64 = 0.8;
const MAX_KYC_LEVEL: u8 = 3;

// ── Context ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Individual,
    Business,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Business => "business",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Branch,
    Online,
    Mobile,
    Atm,
    Wire,
    Crypto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionContext {
    pub amount: f64,
    /// Transactions observed in the current monitoring window.
    pub frequency: f64,
    #[serde(default)]
    pub source_country: Option<String>,
    #[serde(default)]
    pub destination_country: Option<String>,
    /// Local hour of day, 0..=23.
    #[serde(default)]
    pub hour_of_day: Option<u8>,
    #[serde(default)]
    pub channel: Option<Channel>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoricalBaseline {
    pub average_amount: f64,
    pub baseline_frequency: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComplianceFlags {
    pub sanctions_status: bool,
    pub pep_status: bool,
    pub adverse_media_count: u32,
    pub previous_violations: u32,
}

/// Everything one assessment needs to know about an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityContext {
    pub entity_id: EntityId,
    pub entity_type: EntityType,
    /// Display name, used for screening and report subjects.
    #[serde(default)]
    pub name: Option<String>,
    pub jurisdiction: String,
    #[serde(default)]
    pub transaction: Option<TransactionContext>,
    #[serde(default)]
    pub baseline: HistoricalBaseline,
    #[serde(default)]
    pub flags: ComplianceFlags,
    #[serde(default)]
    pub industry_code: Option<String>,
    pub account_age_days: u32,
    pub kyc_level: u8,
}

impl EntityContext {
    /// Reject malformed input before any scoring happens.
    pub fn validate(&self) -> AmlResult<()> {
        if self.entity_id.trim().is_empty() {
            return Err(AmlError::Validation("entity_id is required".into()));
        }
        if self.jurisdiction.trim().is_empty() {
            return Err(AmlError::Validation(format!(
                "jurisdiction is required for entity '{}'",
                self.entity_id
            )));
        }
        if self.kyc_level > MAX_KYC_LEVEL {
            return Err(AmlError::Validation(format!(
                "kyc_level must be in 0..={MAX_KYC_LEVEL}, got {}",
                self.kyc_level
            )));
        }
        check_non_negative("baseline.average_amount", self.baseline.average_amount)?;
        check_non_negative("baseline.baseline_frequency", self.baseline.baseline_frequency)?;
        if let Some(txn) = &self.transaction {
            check_non_negative("transaction.amount", txn.amount)?;
            check_non_negative("transaction.frequency", txn.frequency)?;
            if let Some(hour) = txn.hour_of_day {
                if hour > 23 {
                    return Err(AmlError::Validation(format!(
                        "transaction.hour_of_day must be in 0..=23, got {hour}"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn check_non_negative(field: &str, value: f64) -> AmlResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(AmlError::Validation(format!(
            "{field} must be a finite non-negative number, got {value}"
        )));
    }
    Ok(())
}

// ── Output ───────────────────────────────────────────────────────────────────

/// Normalized sub-scores for one assessment. Each field is in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskFactors {
    pub geographic: f64,
    pub transaction_pattern: f64,
    pub velocity: f64,
    pub sanctions: f64,
    pub pep: f64,
    pub adverse_media: f64,
    pub industry: f64,
    pub behavioral: f64,
    /// Computed and reported, but not part of the weighted score.
    pub channel: f64,
}

impl RiskFactors {
    /// (name, value) pairs in declaration order.
    pub fn named(&self) -> [(&'static str, f64); 9] {
        [
            ("geographic", self.geographic),
            ("transaction_pattern", self.transaction_pattern),
            ("velocity", self.velocity),
            ("sanctions", self.sanctions),
            ("pep", self.pep),
            ("adverse_media", self.adverse_media),
            ("industry", self.industry),
            ("behavioral", self.behavioral),
            ("channel", self.channel),
        ]
    }
}

// ── Calculator ───────────────────────────────────────────────────────────────

pub struct RiskFactorCalculator {
    geo: Arc<dyn GeoRisk>,
    industries: IndustryLists,
}

/// Country tier as seen by the geographic rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum CountryTier {
    Standard,
    Medium,
    High,
}

impl RiskFactorCalculator {
    pub fn new(geo: Arc<dyn GeoRisk>, industries: IndustryLists) -> Self {
        Self { geo, industries }
    }

    pub fn calculate(&self, ctx: &EntityContext) -> RiskFactors {
        let txn = ctx.transaction.as_ref();
        RiskFactors {
            geographic: self.geographic(&ctx.jurisdiction, txn),
            transaction_pattern: txn
                .map(|t| transaction_pattern(t, &ctx.baseline))
                .unwrap_or(0.0),
            velocity: txn.map(|t| velocity(t, &ctx.baseline)).unwrap_or(0.0),
            sanctions: if ctx.flags.sanctions_status { SANCTIONS_HIT } else { 0.0 },
            pep: if ctx.flags.pep_status { PEP_HIT } else { 0.0 },
            adverse_media: (ctx.flags.adverse_media_count as f64 * ADVERSE_MEDIA_PER_ARTICLE)
                .min(1.0),
            industry: self.industry(ctx.industry_code.as_deref()),
            behavioral: behavioral(
                ctx.account_age_days,
                ctx.kyc_level,
                ctx.flags.previous_violations,
            ),
            channel: channel(txn.and_then(|t| t.channel)),
        }
    }

    /// Sanctioned countries rank with the FATF black list.
    fn tier(&self, country: &str) -> CountryTier {
        let risk = self.geo.assess(country);
        match risk.fatf_status {
            _ if risk.sanctioned => CountryTier::High,
            FatfStatus::BlackList => CountryTier::High,
            FatfStatus::GreyList => CountryTier::Medium,
            FatfStatus::Compliant => CountryTier::Standard,
        }
    }

    fn geographic(&self, jurisdiction: &str, txn: Option<&TransactionContext>) -> f64 {
        let mut score = match self.tier(jurisdiction) {
            CountryTier::High => ENTITY_HIGH_RISK_JURISDICTION,
            CountryTier::Medium => ENTITY_MEDIUM_RISK_JURISDICTION,
            CountryTier::Standard => 0.0,
        };

        if let Some(txn) = txn {
            let worst_leg = [txn.source_country.as_deref(), txn.destination_country.as_deref()]
                .into_iter()
                .flatten()
                .map(|c| self.tier(c))
                .max()
                .unwrap_or(CountryTier::Standard);
            score += match worst_leg {
                CountryTier::High => LEG_HIGH_RISK_JURISDICTION,
                CountryTier::Medium => LEG_MEDIUM_RISK_JURISDICTION,
                CountryTier::Standard => 0.0,
            };

            if let (Some(src), Some(dst)) = (&txn.source_country, &txn.destination_country) {
                if !src.eq_ignore_ascii_case(dst) {
                    score += CROSS_BORDER;
                }
            }
        }

        clamp_unit(score)
    }

    fn industry(&self, code: Option<&str>) -> f64 {
        match code {
            None => INDUSTRY_UNKNOWN,
            Some(c) if self.industries.is_high_risk(c) => INDUSTRY_HIGH,
            Some(c) if self.industries.is_medium_risk(c) => INDUSTRY_MEDIUM,
            Some(_) => INDUSTRY_OTHER,
        }
    }
}

fn transaction_pattern(txn: &TransactionContext, baseline: &HistoricalBaseline) -> f64 {
    let mut score = deviation_score(txn.amount, baseline.average_amount)
        + deviation_score(txn.frequency, baseline.baseline_frequency);

    if is_round_amount(txn.amount) {
        score += ROUND_AMOUNT;
    }
    if txn.amount > LARGE_AMOUNT_THRESHOLD {
        score += LARGE_AMOUNT;
    }

    clamp_unit(score)
}

/// Relative deviation from a baseline. A zero baseline carries no signal.
fn deviation_score(observed: f64, baseline: f64) -> f64 {
    if baseline <= 0.0 {
        return 0.0;
    }
    let deviation = (observed - baseline).abs() / baseline;
    if deviation > 2.0 {
        LARGE_DEVIATION
    } else if deviation > 1.0 {
        MODERATE_DEVIATION
    } else {
        0.0
    }
}

/// Whole-number amount of at least 100 ending in "00".
fn is_round_amount(amount: f64) -> bool {
    amount >= 100.0 && amount.fract() == 0.0 && (amount as u64) % 100 == 0
}

/// Step function on frequency / baseline, not additive.
fn velocity(txn: &TransactionContext, baseline: &HistoricalBaseline) -> f64 {
    if baseline.baseline_frequency <= 0.0 {
        return 0.0;
    }
    let ratio = txn.frequency / baseline.baseline_frequency;
    if ratio > 5.0 {
        0.9
    } else if ratio > 3.0 {
        0.6
    } else if ratio > 2.0 {
        0.3
    } else {
        0.0
    }
}

fn behavioral(account_age_days: u32, kyc_level: u8, previous_violations: u32) -> f64 {
    let age = account_age_days as f64;
    let kyc = kyc_level.min(MAX_KYC_LEVEL) as f64;
    let max_kyc = MAX_KYC_LEVEL as f64;

    let new_account = ((365.0 - age) / 365.0 * NEW_ACCOUNT_WEIGHT).max(0.0);
    let low_kyc = ((max_kyc - kyc) / max_kyc * LOW_KYC_WEIGHT).max(0.0);
    let violations = (previous_violations as f64 * VIOLATION_WEIGHT).min(VIOLATION_CAP);

    (new_account + low_kyc + violations).min(1.0)
}

fn channel(channel: Option<Channel>) -> f64 {
    match channel {
        Some(Channel::Branch) => 0.1,
        Some(Channel::Online) | Some(Channel::Mobile) => 0.3,
        Some(Channel::Atm) => 0.4,
        Some(Channel::Wire) => 0.5,
        Some(Channel::Crypto) => 0.8,
        None => 0.3,
    }
}

pub(crate) fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}
