//! The AML engine: one façade over scoring, alerting and reporting.
//!
//! ASSESSMENT ORDER (fixed):
//!   1. Validate the context
//!   2. Screen the entity name (when screens are wired)
//!   3. Rule-based risk factors
//!   4. ML prediction ∥ anomaly detection (joined, each time-boxed)
//!   5. Aggregate into one score
//!   6. Create or supersede the risk profile
//!   7. Raise alerts, derive the recommendation
//!
//! RULES:
//!   - Assessments of one entity are serialized; different entities share no lock.
//!   - Alert and report transitions are atomic inside the store.
//!   - Every state change is recorded in the event log.
//!   - "Now" always comes from the injected clock.

use crate::{
    aggregator::{AggregatedScore, RiskScoreAggregator},
    alert::Alert,
    alert_manager::{AlertManager, Recommendation},
    anomaly::{AnomalyDetector, AnomalyFeatures, AnomalyResult, GuardedDetector},
    clock::{Clock, SystemClock},
    command::{AlertAction, ReportAction},
    config::EngineConfig,
    error::{AmlError, AmlResult},
    event::{AmlEvent, EventLogEntry},
    ml::{GuardedPredictor, MlFeatures, MlPredictor},
    profile::RiskProfile,
    regulator::{RegulatorSubmit, SimulatedRegulator, SubmissionReceipt},
    report::{RegulatoryReport, ReportDraft},
    report_workflow::{self, ComplianceScore, ReportWorkflow, ReportingPeriod},
    risk_factors::{EntityContext, RiskFactorCalculator, RiskFactors},
    screening::{FatfGeoRisk, GeoRisk, PepScreen, SanctionsScreen},
    store::AmlStore,
};
use serde::Serialize;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::sync::Mutex as AsyncMutex;

/// Everything one assessment produced.
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub risk_profile: RiskProfile,
    pub risk_factors: RiskFactors,
    pub score: AggregatedScore,
    pub anomaly: AnomalyResult,
    pub new_alerts: Vec<Alert>,
    pub recommendation: Recommendation,
}

type LockMap = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

pub struct AmlEngine {
    store: Arc<dyn AmlStore>,
    clock: Arc<dyn Clock>,
    calculator: RiskFactorCalculator,
    predictor: GuardedPredictor,
    detector: GuardedDetector,
    aggregator: RiskScoreAggregator,
    alerts: AlertManager,
    reports: ReportWorkflow,
    sanctions: Option<Arc<dyn SanctionsScreen>>,
    peps: Option<Arc<dyn PepScreen>>,
    entity_locks: LockMap,
    report_locks: LockMap,
}

/// Wires collaborators into an engine. Anything not supplied falls back
/// to the offline default.
pub struct EngineBuilder {
    config: EngineConfig,
    store: Arc<dyn AmlStore>,
    clock: Arc<dyn Clock>,
    ml: Option<Arc<dyn MlPredictor>>,
    anomaly: Option<Arc<dyn AnomalyDetector>>,
    regulator: Option<Arc<dyn RegulatorSubmit>>,
    sanctions: Option<Arc<dyn SanctionsScreen>>,
    peps: Option<Arc<dyn PepScreen>>,
    geo: Option<Arc<dyn GeoRisk>>,
}

impl EngineBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ml_predictor(mut self, predictor: Arc<dyn MlPredictor>) -> Self {
        self.ml = Some(predictor);
        self
    }

    pub fn anomaly_detector(mut self, detector: Arc<dyn AnomalyDetector>) -> Self {
        self.anomaly = Some(detector);
        self
    }

    pub fn regulator(mut self, regulator: Arc<dyn RegulatorSubmit>) -> Self {
        self.regulator = Some(regulator);
        self
    }

    pub fn sanctions_screen(mut self, screen: Arc<dyn SanctionsScreen>) -> Self {
        self.sanctions = Some(screen);
        self
    }

    pub fn pep_screen(mut self, screen: Arc<dyn PepScreen>) -> Self {
        self.peps = Some(screen);
        self
    }

    /// Country risk provider. Defaults to the configured FATF lists.
    pub fn geo_risk(mut self, geo: Arc<dyn GeoRisk>) -> Self {
        self.geo = Some(geo);
        self
    }

    pub fn build(self) -> AmlEngine {
        let config = self.config;
        let regulator = self
            .regulator
            .unwrap_or_else(|| Arc::new(SimulatedRegulator::new(&config.regulator)));
        let geo = self.geo.unwrap_or_else(|| {
            Arc::new(FatfGeoRisk::new(config.jurisdictions.clone(), FatfGeoRisk::default_sanctioned()))
        });
        if !config.reporting.has_institution() {
            log::warn!("reporting institution name/id not configured; report submissions will fail validation");
        }

        AmlEngine {
            calculator: RiskFactorCalculator::new(geo, config.industries.clone()),
            predictor: GuardedPredictor::new(self.ml, &config.ml),
            detector: GuardedDetector::new(self.anomaly, &config.anomaly),
            aggregator: RiskScoreAggregator::new(),
            alerts: AlertManager::new(),
            reports: ReportWorkflow::new(config.reporting.clone(), regulator, &config.regulator),
            sanctions: self.sanctions,
            peps: self.peps,
            store: self.store,
            clock: self.clock,
            entity_locks: Mutex::new(HashMap::new()),
            report_locks: Mutex::new(HashMap::new()),
        }
    }
}

fn lock_for(locks: &LockMap, key: &str, what: &'static str) -> AmlResult<Arc<AsyncMutex<()>>> {
    let mut locks = locks.lock().map_err(|_| AmlError::LockPoisoned(what))?;
    // Forget locks nobody is holding or waiting on.
    locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    Ok(locks.entry(key.to_string()).or_default().clone())
}

impl AmlEngine {
    pub fn builder(config: EngineConfig, store: Arc<dyn AmlStore>) -> EngineBuilder {
        EngineBuilder {
            config,
            store,
            clock: Arc::new(SystemClock),
            ml: None,
            anomaly: None,
            regulator: None,
            sanctions: None,
            peps: None,
            geo: None,
        }
    }

    pub fn store(&self) -> &dyn AmlStore {
        self.store.as_ref()
    }

    fn record(&self, event: AmlEvent) -> AmlResult<()> {
        self.store.append_event(&EventLogEntry::from_event(&event)?)?;
        Ok(())
    }

    // ── Assessment ─────────────────────────────────────────────

    pub async fn assess(&self, ctx: &EntityContext) -> AmlResult<Assessment> {
        ctx.validate()?;

        let lock = lock_for(&self.entity_locks, &ctx.entity_id, "entity locks")?;
        let _serialized = lock.lock().await;
        let now = self.clock.now();

        let ctx = self.screened(ctx);
        let factors = self.calculator.calculate(&ctx);

        let txn = ctx.transaction.as_ref();
        let ml_features = MlFeatures {
            entity_id: ctx.entity_id.clone(),
            entity_type: ctx.entity_type,
            amount: txn.map_or(0.0, |t| t.amount),
            frequency: txn.map_or(0.0, |t| t.frequency),
            account_age_days: ctx.account_age_days,
            kyc_level: ctx.kyc_level,
            factors,
        };
        let anomaly_features = txn.map(|t| AnomalyFeatures {
            entity_id: ctx.entity_id.clone(),
            amount: t.amount,
            frequency: t.frequency,
            hour_of_day: t.hour_of_day,
            channel: t.channel,
        });

        let (prediction, anomaly) = tokio::join!(self.predictor.predict(&ml_features), async {
            match &anomaly_features {
                Some(features) => self.detector.detect(features, &ctx.baseline).await,
                None => AnomalyResult::default(),
            }
        });

        let score = self.aggregator.aggregate(&factors, &prediction, &anomaly);

        let profile = match self.store.load_profile(&ctx.entity_id)? {
            Some(mut profile) => {
                profile.update_risk_score(&score, factors, Some(prediction.clone()), now)?;
                profile
            }
            None => RiskProfile::create(
                ctx.entity_id.clone(),
                ctx.entity_type,
                &score,
                factors,
                Some(prediction.clone()),
                now,
            )?,
        };
        self.store.save_profile(&profile)?;
        self.record(AmlEvent::RiskAssessed {
            at: now,
            entity_id: ctx.entity_id.clone(),
            overall_risk_score: score.overall,
            risk_level: score.level,
            model_version: prediction.model_version.clone(),
            anomaly: anomaly.is_anomaly,
        })?;

        let new_alerts = self.alerts.evaluate(&ctx.entity_id, &score, &prediction, &anomaly, now)?;
        for alert in &new_alerts {
            self.store.insert_alert(alert)?;
            self.record(AmlEvent::AlertCreated {
                at: now,
                alert_id: alert.id.clone(),
                entity_id: alert.entity_id.clone(),
                alert_type: alert.alert_type,
                severity: alert.severity,
                priority: alert.priority,
                due_date: alert.due_date,
            })?;
            log::info!(
                "entity={} alert={} type={} severity={:?} due={}",
                alert.entity_id,
                alert.id,
                alert.alert_type.as_str(),
                alert.severity,
                alert.due_date
            );
        }

        let open: Vec<Alert> = self
            .store
            .alerts_for_entity(&ctx.entity_id)?
            .into_iter()
            .filter(|a| !a.status.is_terminal())
            .collect();
        let recommendation = self.alerts.recommend(score.overall, &open);

        log::info!(
            "entity={} score={:.3} level={} model={} anomaly={} alerts={} action={:?}",
            ctx.entity_id,
            score.overall,
            score.level.as_str(),
            prediction.model_version,
            anomaly.is_anomaly,
            new_alerts.len(),
            recommendation.action
        );

        Ok(Assessment {
            risk_profile: profile,
            risk_factors: factors,
            score,
            anomaly,
            new_alerts,
            recommendation,
        })
    }

    /// Context with screening hits folded into its compliance flags.
    /// Screening can only raise a flag, never clear one.
    fn screened(&self, ctx: &EntityContext) -> EntityContext {
        let mut ctx = ctx.clone();
        let Some(name) = ctx.name.clone() else {
            return ctx;
        };
        let country = Some(ctx.jurisdiction.as_str());

        if let Some(screen) = &self.sanctions {
            let result = screen.screen(&name, None, country, ctx.entity_type);
            if result.has_matches {
                log::info!("entity={} sanctions matches={}", ctx.entity_id, result.matches.len());
                ctx.flags.sanctions_status = true;
            }
        }
        if let Some(screen) = &self.peps {
            let result = screen.screen(&name, country);
            if result.is_pep {
                log::info!("entity={} PEP positions={:?}", ctx.entity_id, result.positions);
                ctx.flags.pep_status = true;
            }
        }
        ctx
    }

    pub fn profile(&self, entity_id: &str) -> AmlResult<Option<RiskProfile>> {
        self.store.load_profile(entity_id)
    }

    /// Profiles whose scheduled review date has passed.
    pub fn reviews_due(&self) -> AmlResult<Vec<RiskProfile>> {
        let now = self.clock.now();
        Ok(self
            .store
            .list_profiles()?
            .into_iter()
            .filter(|p| p.is_review_due(now))
            .collect())
    }

    // ── Alerts ─────────────────────────────────────────────────

    pub fn transition(&self, alert_id: &str, action: &AlertAction) -> AmlResult<Alert> {
        let now = self.clock.now();
        let step = self.alerts.transition(self.store.as_ref(), alert_id, action, now)?;

        self.record(AmlEvent::AlertTransitioned {
            at: now,
            alert_id: step.alert.id.clone(),
            entity_id: step.alert.entity_id.clone(),
            action: action.name().to_string(),
            from: step.from,
            to: step.alert.status,
        })?;
        log::info!(
            "alert={} {} {} -> {}",
            alert_id,
            action.name(),
            step.from,
            step.alert.status
        );
        Ok(step.alert)
    }

    pub fn alerts_for_entity(&self, entity_id: &str) -> AmlResult<Vec<Alert>> {
        self.store.alerts_for_entity(entity_id)
    }

    pub fn overdue_alerts(&self) -> AmlResult<Vec<Alert>> {
        let now = self.clock.now();
        Ok(self.alerts.overdue_alerts(self.store.list_alerts()?, now))
    }

    // ── Reports ────────────────────────────────────────────────

    pub fn draft_report(&self, alert_id: &str, draft: ReportDraft) -> AmlResult<RegulatoryReport> {
        let now = self.clock.now();
        let alert = self.store.get_alert(alert_id)?;
        let report = self.reports.draft(&alert, draft, now)?;
        self.store.insert_report(&report)?;

        self.record(AmlEvent::ReportDrafted {
            at: now,
            report_id: report.id.clone(),
            alert_id: alert.id.clone(),
            entity_id: report.entity_id.clone(),
            report_type: report.report_type,
            filing_deadline: report.filing_deadline,
        })?;
        log::info!(
            "report={} type={} drafted from alert={} deadline={}",
            report.id,
            report.report_type.as_str(),
            alert.id,
            report.filing_deadline
        );
        Ok(report)
    }

    /// Shares the per-report lock with `submit_report`, so no transition
    /// lands while a filing is in flight.
    pub async fn report_transition(&self, report_id: &str, action: &ReportAction) -> AmlResult<RegulatoryReport> {
        let lock = lock_for(&self.report_locks, report_id, "report locks")?;
        let _serialized = lock.lock().await;
        let now = self.clock.now();
        let step = self.reports.transition(self.store.as_ref(), report_id, action, now)?;

        if step.from != step.report.status {
            self.record(AmlEvent::ReportStatusChanged {
                at: now,
                report_id: step.report.id.clone(),
                entity_id: step.report.entity_id.clone(),
                action: action.name().to_string(),
                from: step.from,
                to: step.report.status,
            })?;
        }
        log::info!("report={} {} {} -> {}", report_id, action.name(), step.from, step.report.status);
        Ok(step.report)
    }

    /// Supersede a filed report with a new draft.
    pub async fn amend_report(&self, report_id: &str) -> AmlResult<RegulatoryReport> {
        let lock = lock_for(&self.report_locks, report_id, "report locks")?;
        let _serialized = lock.lock().await;
        let now = self.clock.now();
        let amendment = self.reports.amend(self.store.as_ref(), report_id, now)?;

        self.record(AmlEvent::ReportDrafted {
            at: now,
            report_id: amendment.id.clone(),
            alert_id: amendment.alert_id.clone(),
            entity_id: amendment.entity_id.clone(),
            report_type: amendment.report_type,
            filing_deadline: amendment.filing_deadline,
        })?;
        log::info!("report={} amended by {}", report_id, amendment.id);
        Ok(amendment)
    }

    /// Submissions and transitions of one report are serialized, so the
    /// regulator is called at most once per successful filing and the
    /// report cannot change state under an in-flight call.
    pub async fn submit_report(&self, report_id: &str) -> AmlResult<SubmissionReceipt> {
        let lock = lock_for(&self.report_locks, report_id, "report locks")?;
        let _serialized = lock.lock().await;
        let now = self.clock.now();

        match self.reports.submit(self.store.as_ref(), report_id, now).await {
            Ok(filing) => {
                self.record(AmlEvent::ReportSubmitted {
                    at: now,
                    report_id: filing.report.id.clone(),
                    entity_id: filing.report.entity_id.clone(),
                    submission_id: filing.receipt.submission_id.clone(),
                    acknowledgment_number: filing.receipt.acknowledgment_number.clone(),
                    late_filing: filing.report.late_filing(),
                })?;
                if filing.report.late_filing() {
                    log::warn!(
                        "report={} filed late: deadline={} filed={}",
                        report_id,
                        filing.report.filing_deadline,
                        now
                    );
                }
                log::info!("report={} submitted as {}", report_id, filing.receipt.submission_id);
                Ok(filing.receipt)
            }
            Err(e @ AmlError::Regulator { .. }) => {
                let report = self.store.get_report(report_id)?;
                self.record(AmlEvent::ReportSubmissionFailed {
                    at: now,
                    report_id: report.id.clone(),
                    entity_id: report.entity_id.clone(),
                    reason: e.to_string(),
                })?;
                log::warn!("report={} submission failed, still {}: {e}", report_id, report.status);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Unfiled reports due within `hours`, including overdue ones.
    pub fn reports_due_within(&self, hours: i64) -> AmlResult<Vec<RegulatoryReport>> {
        let now = self.clock.now();
        Ok(report_workflow::reports_due_within(self.store.list_reports()?, now, hours))
    }

    /// Compliance score over reports created in `period`, or over all
    /// reports when no period is given.
    pub fn compliance_score(&self, period: Option<ReportingPeriod>) -> AmlResult<ComplianceScore> {
        let reports: Vec<RegulatoryReport> = self
            .store
            .list_reports()?
            .into_iter()
            .filter(|r| period.map_or(true, |p| p.contains(r.created_at)))
            .collect();
        Ok(report_workflow::compliance_score(&reports))
    }

    pub fn events_for_entity(&self, entity_id: &str) -> AmlResult<Vec<AmlEvent>> {
        self.store
            .events_for_entity(entity_id)?
            .iter()
            .map(|e| e.decode().map_err(AmlError::from))
            .collect()
    }
}

