//! Sanctions, PEP and country screening.
//!
//! The engine only depends on the result shapes. `WatchlistScreen` and
//! `FatfGeoRisk` are list-backed implementations for the runner and tests;
//! production deployments plug in a provider behind the same traits.

use crate::{
    config::JurisdictionLists,
    risk_factors::{ComplianceFlags, EntityType},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

const SANCTIONS_EXACT_MATCH_THRESHOLD: f64 = 0.95;
const SANCTIONS_FUZZY_MATCH_THRESHOLD: f64 = 0.80;
const PEP_NAME_MATCH_THRESHOLD: f64 = 0.85;

const BLACK_LIST_SCORE: f64 = 0.9;
const GREY_LIST_SCORE: f64 = 0.5;
const COMPLIANT_SCORE: f64 = 0.1;

// ── Result shapes ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanctionsMatch {
    pub listed_name: String,
    pub program: String,
    pub match_score: f64,
    pub match_type: MatchType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SanctionsResult {
    pub has_matches: bool,
    pub matches: Vec<SanctionsMatch>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PepRiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PepResult {
    pub is_pep: bool,
    pub positions: Vec<String>,
    pub risk_level: PepRiskLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatfStatus {
    BlackList,
    GreyList,
    Compliant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoRiskResult {
    pub risk_score: f64,
    pub sanctioned: bool,
    pub fatf_status: FatfStatus,
}

// ── Contracts ────────────────────────────────────────────────────────────────

pub trait SanctionsScreen: Send + Sync {
    fn screen(
        &self,
        name: &str,
        birth_date: Option<NaiveDate>,
        country: Option<&str>,
        entity_type: EntityType,
    ) -> SanctionsResult;
}

pub trait PepScreen: Send + Sync {
    fn screen(&self, name: &str, country: Option<&str>) -> PepResult;
}

pub trait GeoRisk: Send + Sync {
    fn assess(&self, country: &str) -> GeoRiskResult;
}

impl ComplianceFlags {
    /// Flags for the risk-factor calculator from screening outcomes.
    pub fn from_screening(
        sanctions: &SanctionsResult,
        pep: &PepResult,
        adverse_media_count: u32,
        previous_violations: u32,
    ) -> Self {
        Self {
            sanctions_status: sanctions.has_matches,
            pep_status: pep.is_pep,
            adverse_media_count,
            previous_violations,
        }
    }
}

// ── Watchlists ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanctionsEntry {
    pub full_name: String,
    pub program: String,
    #[serde(default)]
    pub entity_type: Option<EntityType>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PepEntry {
    pub full_name: String,
    pub position: String,
    #[serde(default)]
    pub country: Option<String>,
    pub risk_level: PepRiskLevel,
}

/// In-memory sanctions and PEP lists with word-overlap name matching.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchlistScreen {
    #[serde(default)]
    pub sanctions: Vec<SanctionsEntry>,
    #[serde(default)]
    pub peps: Vec<PepEntry>,
}

impl WatchlistScreen {
    pub fn new(sanctions: Vec<SanctionsEntry>, peps: Vec<PepEntry>) -> Self {
        Self { sanctions, peps }
    }
}

/// Both known and different means the records describe different people.
fn conflicts<T: PartialEq>(query: Option<T>, listed: Option<T>) -> bool {
    matches!((query, listed), (Some(q), Some(l)) if q != l)
}

fn same_country(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

impl SanctionsScreen for WatchlistScreen {
    fn screen(
        &self,
        name: &str,
        birth_date: Option<NaiveDate>,
        country: Option<&str>,
        entity_type: EntityType,
    ) -> SanctionsResult {
        let matches: Vec<SanctionsMatch> = self
            .sanctions
            .iter()
            .filter(|e| !conflicts(Some(entity_type), e.entity_type))
            .filter(|e| !conflicts(birth_date, e.birth_date))
            .filter(|e| match (country, e.country.as_deref()) {
                (Some(q), Some(l)) => same_country(q, l),
                _ => true,
            })
            .filter_map(|e| {
                let score = name_match_score(name, &e.full_name);
                (score >= SANCTIONS_FUZZY_MATCH_THRESHOLD).then(|| SanctionsMatch {
                    listed_name: e.full_name.clone(),
                    program: e.program.clone(),
                    match_score: score,
                    match_type: if score >= SANCTIONS_EXACT_MATCH_THRESHOLD {
                        MatchType::Exact
                    } else {
                        MatchType::Fuzzy
                    },
                })
            })
            .collect();

        SanctionsResult { has_matches: !matches.is_empty(), matches }
    }
}

impl PepScreen for WatchlistScreen {
    fn screen(&self, name: &str, country: Option<&str>) -> PepResult {
        let hits: Vec<&PepEntry> = self
            .peps
            .iter()
            .filter(|p| match (country, p.country.as_deref()) {
                (Some(q), Some(l)) => same_country(q, l),
                _ => true,
            })
            .filter(|p| name_match_score(name, &p.full_name) >= PEP_NAME_MATCH_THRESHOLD)
            .collect();

        PepResult {
            is_pep: !hits.is_empty(),
            positions: hits.iter().map(|p| p.position.clone()).collect(),
            risk_level: hits.iter().map(|p| p.risk_level).max().unwrap_or_default(),
        }
    }
}

/// Share of words the two names have in common, with prefix matches
/// counting ("Mohd" ~ "Mohammed"). 1.0 on a case-insensitive exact match.
pub fn name_match_score(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let words_a: Vec<&str> = a.split_whitespace().collect();
    let words_b: Vec<&str> = b.split_whitespace().collect();

    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }
    if words_a == words_b {
        return 1.0;
    }

    let shared = words_a
        .iter()
        .filter(|wa| {
            words_b
                .iter()
                .any(|wb| wa == &wb || wa.starts_with(*wb) || wb.starts_with(**wa))
        })
        .count();

    shared as f64 / words_a.len().max(words_b.len()) as f64
}

// ── Country risk ─────────────────────────────────────────────────────────────

/// Country risk from the configured FATF lists plus a sanctioned-country list.
pub struct FatfGeoRisk {
    jurisdictions: JurisdictionLists,
    sanctioned: Vec<String>,
}

impl FatfGeoRisk {
    pub fn new(jurisdictions: JurisdictionLists, sanctioned: Vec<String>) -> Self {
        Self { jurisdictions, sanctioned }
    }

    /// Comprehensively sanctioned countries.
    pub fn default_sanctioned() -> Vec<String> {
        ["CU", "IR", "KP", "SY"].iter().map(|c| c.to_string()).collect()
    }
}

impl GeoRisk for FatfGeoRisk {
    fn assess(&self, country: &str) -> GeoRiskResult {
        let sanctioned = self.sanctioned.iter().any(|c| same_country(c, country));
        let (fatf_status, base) = if self.jurisdictions.is_high_risk(country) {
            (FatfStatus::BlackList, BLACK_LIST_SCORE)
        } else if self.jurisdictions.is_medium_risk(country) {
            (FatfStatus::GreyList, GREY_LIST_SCORE)
        } else {
            (FatfStatus::Compliant, COMPLIANT_SCORE)
        };

        GeoRiskResult {
            risk_score: if sanctioned { 1.0 } else { base },
            sanctioned,
            fatf_status,
        }
    }
}
