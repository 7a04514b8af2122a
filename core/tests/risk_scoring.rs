//! Integration tests: assessment pipeline, collaborator fallbacks, profiles.

mod common;

use aml_core::{
    aggregator::RiskLevel,
    alert::{AlertType, Severity},
    alert_manager::RecommendedAction,
    anomaly::AnomalyResult,
    config::EngineConfig,
    event::AmlEvent,
    ml::{AlertRecommendation, FALLBACK_MODEL_VERSION},
    risk_factors::{Channel, TransactionContext},
    screening::{SanctionsEntry, WatchlistScreen},
    AmlError,
};
use chrono::Duration;
use common::*;
use std::sync::Arc;

fn wire_transfer(amount: f64, frequency: f64) -> TransactionContext {
    TransactionContext {
        amount,
        frequency,
        source_country: Some("US".into()),
        destination_country: Some("US".into()),
        hour_of_day: Some(14),
        channel: Some(Channel::Wire),
    }
}

/// A sanctions hit alone, with the model offline, must still raise an alert.
#[tokio::test]
async fn sanctioned_entity_crosses_alert_threshold_offline() {
    let h = offline_engine(t(2024, 4, 2, 9));
    let mut ctx = quiet_context("cust-sanctioned");
    ctx.flags.sanctions_status = true;

    let a = h.engine.assess(&ctx).await.unwrap();

    assert_eq!(a.risk_factors.sanctions, 1.0);
    assert!((a.score.traditional - 0.26).abs() < 1e-9, "traditional={}", a.score.traditional);
    assert!(a.score.overall >= 0.7, "overall={}", a.score.overall);
    assert!(a.score.level >= RiskLevel::High, "level={:?}", a.score.level);
    assert!(
        a.new_alerts.iter().any(|al| al.alert_type == AlertType::HighRiskScore),
        "expected a HIGH_RISK_SCORE alert, got {:?}",
        a.new_alerts
    );
    let prediction = a.risk_profile.ml_scoring.as_ref().unwrap();
    assert_eq!(prediction.model_version, FALLBACK_MODEL_VERSION);
}

/// Disabled ML and anomaly detection still produce a complete, in-range score.
#[tokio::test]
async fn disabled_collaborators_still_score() {
    let h = offline_engine(t(2024, 4, 2, 9));

    let mut busy = quiet_context("cust-busy");
    busy.transaction = Some(wire_transfer(25_000.0, 40.0));
    busy.account_age_days = 12;
    busy.kyc_level = 0;
    busy.flags.previous_violations = 9;

    for ctx in [quiet_context("cust-quiet"), busy] {
        let a = h.engine.assess(&ctx).await.unwrap();
        assert!((0.0..=1.0).contains(&a.score.overall), "{} scored {}", ctx.entity_id, a.score.overall);
        assert!(a.risk_profile.ml_scoring.as_ref().is_some_and(|p| p.is_fallback()));
        assert_eq!(a.risk_profile.assessment_count, 1);
        assert!(h.engine.profile(&ctx.entity_id).unwrap().is_some());
    }
}

/// A HIGH profile is due for review exactly thirty days after assessment.
#[tokio::test]
async fn high_profile_review_date() {
    let start = t(2024, 3, 10, 15);
    let (builder, _clock, _store) = builder_at(start, online_config());
    let engine = builder
        .ml_predictor(Arc::new(FixedPredictor { score: 1.0, recommendations: vec![] }))
        .build();

    let a = engine.assess(&quiet_context("cust-high")).await.unwrap();

    assert_eq!(a.risk_profile.risk_level, RiskLevel::High);
    assert_eq!(a.risk_profile.next_review_date, start + Duration::days(30));
    assert!(a.new_alerts.is_empty(), "0.604 is below the alert threshold");
    assert_eq!(a.recommendation.action, RecommendedAction::EnhanceDueDiligence);
}

/// An erroring predictor is replaced by the fallback, not surfaced.
#[tokio::test]
async fn failing_predictor_falls_back() {
    let (builder, _clock, _store) = builder_at(t(2024, 3, 10, 15), online_config());
    let engine = builder.ml_predictor(Arc::new(FailingPredictor)).build();

    let a = engine.assess(&quiet_context("cust-1")).await.unwrap();
    assert_eq!(a.risk_profile.ml_scoring.unwrap().model_version, FALLBACK_MODEL_VERSION);
}

/// A predictor slower than its timeout is treated as unavailable.
#[tokio::test(start_paused = true)]
async fn slow_predictor_times_out_to_fallback() {
    let (builder, _clock, _store) = builder_at(t(2024, 3, 10, 15), online_config());
    let engine = builder.ml_predictor(Arc::new(SlowPredictor)).build();

    let a = engine.assess(&quiet_context("cust-1")).await.unwrap();
    assert!(a.risk_profile.ml_scoring.unwrap().is_fallback());
}

/// Confident model recommendations each raise an alert of their own type.
#[tokio::test]
async fn model_recommendations_raise_alerts() {
    let (builder, _clock, _store) = builder_at(t(2024, 3, 10, 15), online_config());
    let engine = builder
        .ml_predictor(Arc::new(FixedPredictor {
            score: 0.2,
            recommendations: vec![
                AlertRecommendation {
                    alert_type: AlertType::Structuring,
                    probability: 0.82,
                    severity: Some(Severity::Critical),
                    reason: Some("deposits clustered under 10k".into()),
                },
                AlertRecommendation {
                    alert_type: AlertType::RapidMovement,
                    probability: 0.4,
                    severity: None,
                    reason: None,
                },
            ],
        }))
        .build();

    let a = engine.assess(&quiet_context("cust-struct")).await.unwrap();

    assert_eq!(a.new_alerts.len(), 1);
    let alert = &a.new_alerts[0];
    assert_eq!(alert.alert_type, AlertType::Structuring);
    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(alert.description, "deposits clustered under 10k");
    assert_eq!(a.recommendation.action, RecommendedAction::Block);
}

/// A flagged anomaly boosts the score and raises its own alert.
#[tokio::test]
async fn anomaly_boosts_score_and_alerts() {
    let (builder, _clock, _store) = builder_at(t(2024, 3, 10, 15), online_config());
    let engine = builder
        .ml_predictor(Arc::new(FixedPredictor { score: 0.5, recommendations: vec![] }))
        .anomaly_detector(Arc::new(FixedDetector(AnomalyResult {
            is_anomaly: true,
            anomaly_score: 0.9,
            anomaly_types: ["velocity_spike".to_string()].into_iter().collect(),
        })))
        .build();

    let mut ctx = quiet_context("cust-anom");
    ctx.transaction = Some(wire_transfer(900.0, 5.0));
    let a = engine.assess(&ctx).await.unwrap();

    assert!((a.score.anomaly_boost - 0.18).abs() < 1e-9, "boost={}", a.score.anomaly_boost);
    assert!(a.new_alerts.iter().any(|al| al.alert_type == AlertType::AnomalyDetected));
}

/// Screening hits raise compliance flags before factors are computed.
#[tokio::test]
async fn watchlist_hit_sets_sanctions_factor() {
    let lists = Arc::new(WatchlistScreen::new(
        vec![SanctionsEntry {
            full_name: "Oleg Listed Person".into(),
            program: "SDN".into(),
            entity_type: None,
            birth_date: None,
            country: None,
        }],
        vec![],
    ));
    let (builder, _clock, _store) = builder_at(t(2024, 3, 10, 15), EngineConfig::default_test());
    let engine = builder.sanctions_screen(lists.clone()).pep_screen(lists).build();

    let mut ctx = quiet_context("cust-oleg");
    ctx.name = Some("OLEG LISTED PERSON".into());
    let a = engine.assess(&ctx).await.unwrap();

    assert_eq!(a.risk_factors.sanctions, 1.0);
    assert_eq!(a.risk_factors.pep, 0.0);
}

/// A later assessment supersedes the profile and is logged.
#[tokio::test]
async fn reassessment_supersedes_profile() {
    let h = offline_engine(t(2024, 4, 2, 9));
    let mut ctx = quiet_context("cust-re");
    h.engine.assess(&ctx).await.unwrap();

    h.clock.advance(Duration::days(3));
    ctx.flags.pep_status = true;
    let second = h.engine.assess(&ctx).await.unwrap();

    assert_eq!(second.risk_profile.assessment_count, 2);
    assert_eq!(second.risk_profile.last_assessment_date, t(2024, 4, 5, 9));
    assert_eq!(second.risk_factors.pep, 0.8);

    let assessed = h
        .engine
        .events_for_entity("cust-re")
        .unwrap()
        .into_iter()
        .filter(|e| matches!(e, AmlEvent::RiskAssessed { .. }))
        .count();
    assert_eq!(assessed, 2);
}

/// Malformed input is rejected before anything is stored.
#[tokio::test]
async fn invalid_context_is_rejected() {
    let h = offline_engine(t(2024, 4, 2, 9));
    let mut ctx = quiet_context("cust-bad");
    ctx.kyc_level = 7;

    assert!(matches!(h.engine.assess(&ctx).await, Err(AmlError::Validation(_))));
    assert!(h.engine.profile("cust-bad").unwrap().is_none());
    assert!(h.engine.events_for_entity("cust-bad").unwrap().is_empty());
}

/// Parallel assessments of one entity are serialized; none is lost.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_assessments_of_one_entity_are_serialized() {
    let h = offline_engine(t(2024, 4, 2, 9));
    let ctx = quiet_context("cust-hot");

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let engine = h.engine.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { engine.assess(&ctx).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let profile = h.engine.profile("cust-hot").unwrap().unwrap();
    assert_eq!(profile.assessment_count, 16);
}

/// Review dates follow the risk level; riskier profiles come due first.
#[tokio::test]
async fn reviews_come_due_by_level() {
    let h = offline_engine(t(2024, 6, 1, 12));
    let mut risky = quiet_context("cust-risky");
    risky.flags.sanctions_status = true;
    h.engine.assess(&risky).await.unwrap();
    h.engine.assess(&quiet_context("cust-calm")).await.unwrap();

    assert!(h.engine.reviews_due().unwrap().is_empty());

    h.clock.advance(Duration::days(30));
    let due: Vec<String> = h
        .engine
        .reviews_due()
        .unwrap()
        .iter()
        .map(|p| p.entity_id().to_string())
        .collect();
    assert_eq!(due, vec!["cust-risky".to_string()]);

    h.clock.advance(Duration::days(60));
    assert_eq!(h.engine.reviews_due().unwrap().len(), 2);
}

/// An injected country-risk provider replaces the configured FATF lists.
#[tokio::test]
async fn injected_geo_provider_drives_geographic_factor() {
    let mut ctx = quiet_context("cust-de");
    ctx.jurisdiction = "DE".into();

    let baseline = offline_engine(t(2024, 6, 1, 12));
    let a = baseline.engine.assess(&ctx).await.unwrap();
    assert_eq!(a.risk_factors.geographic, 0.0);

    let (builder, _clock, _store) = builder_at(t(2024, 6, 1, 12), EngineConfig::default_test());
    let engine = builder.geo_risk(Arc::new(ListedSanctions(vec!["DE"]))).build();
    let a = engine.assess(&ctx).await.unwrap();
    assert!((a.risk_factors.geographic - 0.8).abs() < 1e-9, "geographic={}", a.risk_factors.geographic);

    let mut outbound = quiet_context("cust-us");
    outbound.transaction = Some(TransactionContext {
        destination_country: Some("DE".into()),
        ..wire_transfer(5_000.0, 2.0)
    });
    let a = engine.assess(&outbound).await.unwrap();
    assert!((a.risk_factors.geographic - 0.7).abs() < 1e-9, "geographic={}", a.risk_factors.geographic);
}

/// Prediction and anomaly detection overlap; neither waits on the other.
#[tokio::test(start_paused = true)]
async fn ml_and_anomaly_run_concurrently() {
    let flagged = AnomalyResult {
        is_anomaly: true,
        anomaly_score: 0.7,
        anomaly_types: ["amount_spike".to_string()].into_iter().collect(),
    };
    let (builder, _clock, _store) = builder_at(t(2024, 6, 1, 12), online_config());
    let engine = builder
        .ml_predictor(Arc::new(DelayedPredictor(std::time::Duration::from_millis(150))))
        .anomaly_detector(Arc::new(DelayedDetector(std::time::Duration::from_millis(150), flagged.clone())))
        .build();
    let mut ctx = quiet_context("cust-timed");
    ctx.transaction = Some(wire_transfer(5_000.0, 4.0));

    let started = tokio::time::Instant::now();
    let a = engine.assess(&ctx).await.unwrap();
    let elapsed = started.elapsed();

    let prediction = a.risk_profile.ml_scoring.as_ref().unwrap();
    assert!(!prediction.is_fallback(), "model={}", prediction.model_version);
    assert_eq!(prediction.model_version, "champion-7");
    assert_eq!(a.anomaly, flagged);
    assert!(elapsed < std::time::Duration::from_millis(300), "elapsed={elapsed:?}");
}
