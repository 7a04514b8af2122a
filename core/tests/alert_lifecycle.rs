//! Integration tests: alert state machine through the engine, SLA due
//! dates, concurrent creation and concurrent transitions.

mod common;

use aml_core::{
    alert::{Alert, AlertStatus, AlertType, NewAlert, Priority, Severity},
    clock::Clock,
    command::{AlertAction, Resolution},
    event::AmlEvent,
    store::{AmlStore, MemoryStore, SqliteStore},
    AmlError,
};
use chrono::Duration;
use common::*;
use std::{
    collections::HashSet,
    sync::{Arc, Barrier},
    thread,
};

fn raise(score: f64, at: aml_core::types::Timestamp) -> Alert {
    Alert::raise(
        NewAlert {
            entity_id: "cust-7".into(),
            alert_type: AlertType::HighRiskScore,
            risk_score: score,
            severity: None,
            description: "test alert".into(),
        },
        at,
    )
    .unwrap()
}

fn stored_alert(h: &Harness, score: f64) -> Alert {
    let alert = raise(score, h.clock.now());
    h.store.insert_alert(&alert).unwrap();
    alert
}

/// A CRITICAL alert raised at 09:00 is due at 13:00 the same day.
#[test]
fn critical_alert_due_in_four_hours() {
    let alert = Alert::raise(
        NewAlert {
            entity_id: "cust-7".into(),
            alert_type: AlertType::SanctionsMatch,
            risk_score: 50.0,
            severity: Some(Severity::Critical),
            description: "SDN hit".into(),
        },
        t(2024, 6, 3, 9),
    )
    .unwrap();

    assert_eq!(alert.priority, Priority::Urgent);
    assert_eq!(alert.due_date, t(2024, 6, 3, 13));
}

/// Resolving a NEW alert fails and leaves it NEW.
#[test]
fn resolving_new_alert_fails() {
    let h = offline_engine(t(2024, 6, 3, 9));
    let alert = stored_alert(&h, 80.0);

    let err = h
        .engine
        .transition(
            &alert.id,
            &AlertAction::Resolve {
                reviewer_id: "rev-1".into(),
                resolution: Resolution::Closed,
                notes: None,
            },
        )
        .unwrap_err();

    assert!(
        matches!(&err, AmlError::IllegalTransition { from, action: "resolve", .. } if from == "NEW"),
        "unexpected error: {err}"
    );
    assert_eq!(h.store.get_alert(&alert.id).unwrap().status, AlertStatus::New);
}

/// Full investigation path, each step logged with its before/after states.
#[test]
fn investigation_path_is_logged() {
    let h = offline_engine(t(2024, 6, 3, 9));
    let alert = stored_alert(&h, 80.0);

    let steps = [
        (AlertAction::Assign { user_id: "analyst-1".into() }, AlertStatus::InReview),
        (AlertAction::StartInvestigation { investigator_id: "inv-1".into() }, AlertStatus::Investigated),
        (
            AlertAction::Resolve {
                reviewer_id: "rev-1".into(),
                resolution: Resolution::FalsePositive,
                notes: Some("known payroll pattern".into()),
            },
            AlertStatus::FalsePositive,
        ),
    ];
    for (action, expected) in &steps {
        h.clock.advance(Duration::hours(1));
        let updated = h.engine.transition(&alert.id, action).unwrap();
        assert_eq!(updated.status, *expected, "after {}", action.name());
    }

    let transitions: Vec<(AlertStatus, AlertStatus)> = h
        .engine
        .events_for_entity("cust-7")
        .unwrap()
        .into_iter()
        .filter_map(|e| match e {
            AmlEvent::AlertTransitioned { from, to, .. } => Some((from, to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            (AlertStatus::New, AlertStatus::InReview),
            (AlertStatus::InReview, AlertStatus::Investigated),
            (AlertStatus::Investigated, AlertStatus::FalsePositive),
        ]
    );
    let resolved = h.store.get_alert(&alert.id).unwrap();
    assert_eq!(resolved.resolved_at, Some(t(2024, 6, 3, 12)));
}

/// Terminal alerts refuse escalation and reassignment.
#[test]
fn terminal_alerts_are_frozen() {
    let h = offline_engine(t(2024, 6, 3, 9));
    let alert = stored_alert(&h, 80.0);
    h.engine.transition(&alert.id, &AlertAction::Assign { user_id: "a".into() }).unwrap();
    h.engine
        .transition(
            &alert.id,
            &AlertAction::Resolve { reviewer_id: "r".into(), resolution: Resolution::Closed, notes: None },
        )
        .unwrap();
    let closed = h.store.get_alert(&alert.id).unwrap();

    for action in [
        AlertAction::Escalate { reason: "late tip-off".into() },
        AlertAction::Assign { user_id: "b".into() },
    ] {
        assert!(matches!(
            h.engine.transition(&alert.id, &action),
            Err(AmlError::IllegalTransition { .. })
        ));
    }
    assert_eq!(h.store.get_alert(&alert.id).unwrap(), closed);
}

/// Escalation forces URGENT, but the due date set at creation stands.
#[test]
fn escalation_keeps_original_due_date() {
    let h = offline_engine(t(2024, 6, 3, 9));
    let alert = stored_alert(&h, 20.0);
    let escalated = h
        .engine
        .transition(&alert.id, &AlertAction::Escalate { reason: "linked to SAR subject".into() })
        .unwrap();

    assert_eq!(escalated.priority, Priority::Urgent);
    assert_eq!(escalated.due_date, t(2024, 6, 10, 9));

    let rescored = h.engine.transition(&alert.id, &AlertAction::UpdateRiskScore { score: 72.0 }).unwrap();
    assert_eq!(rescored.severity, Severity::High);
    assert_eq!(rescored.priority, Priority::Urgent);
}

/// Out-of-range rescoring is rejected with no change.
#[test]
fn out_of_range_rescore_rejected() {
    let h = offline_engine(t(2024, 6, 3, 9));
    let alert = stored_alert(&h, 50.0);

    for score in [-1.0, 100.01, f64::NAN] {
        assert!(matches!(
            h.engine.transition(&alert.id, &AlertAction::UpdateRiskScore { score }),
            Err(AmlError::Validation(_))
        ));
    }
    assert_eq!(h.store.get_alert(&alert.id).unwrap(), alert);
}

/// Unknown ids surface as NotFound.
#[test]
fn unknown_alert_not_found() {
    let h = offline_engine(t(2024, 6, 3, 9));
    assert!(matches!(
        h.engine.transition("alert-nope", &AlertAction::Assign { user_id: "a".into() }),
        Err(AmlError::NotFound { kind: "alert", .. })
    ));
}

/// Open alerts past their SLA are reported; resolved ones are not.
#[test]
fn overdue_alerts_follow_the_clock() {
    let h = offline_engine(t(2024, 6, 3, 9));
    let urgent = stored_alert(&h, 95.0);
    let low = stored_alert(&h, 10.0);
    let resolved = stored_alert(&h, 92.0);
    h.engine.transition(&resolved.id, &AlertAction::Assign { user_id: "a".into() }).unwrap();
    h.engine
        .transition(
            &resolved.id,
            &AlertAction::Resolve { reviewer_id: "r".into(), resolution: Resolution::Closed, notes: None },
        )
        .unwrap();

    h.clock.advance(Duration::hours(4));
    assert!(h.engine.overdue_alerts().unwrap().is_empty(), "due exactly now is not overdue");

    h.clock.advance(Duration::minutes(1));
    let overdue: Vec<_> = h.engine.overdue_alerts().unwrap().into_iter().map(|a| a.id).collect();
    assert_eq!(overdue, vec![urgent.id]);

    h.clock.advance(Duration::days(7));
    assert_eq!(h.engine.overdue_alerts().unwrap().len(), 2, "low alert {} now overdue too", low.id);
}

/// N threads raising alerts at the same instant get N distinct ids.
#[test]
fn concurrent_alert_creation_yields_distinct_ids() {
    const N: usize = 64;
    let stores: Vec<Arc<dyn AmlStore>> =
        vec![Arc::new(MemoryStore::new()), Arc::new(SqliteStore::in_memory().unwrap())];

    for store in stores {
        let barrier = Arc::new(Barrier::new(N));
        let at = t(2024, 6, 3, 9);
        let handles: Vec<_> = (0..N)
            .map(|_| {
                let barrier = barrier.clone();
                let store = store.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let alert = raise(75.0, at);
                    store.insert_alert(&alert).unwrap();
                    alert.id
                })
            })
            .collect();

        let ids: HashSet<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), N, "duplicate alert ids generated");
        assert_eq!(store.list_alerts().unwrap().len(), N);
    }
}

/// Racing resolutions of one alert: exactly one wins.
#[test]
fn concurrent_resolutions_serialize() {
    const N: usize = 8;
    let h = offline_engine(t(2024, 6, 3, 9));
    let alert = stored_alert(&h, 80.0);
    h.engine.transition(&alert.id, &AlertAction::Assign { user_id: "a".into() }).unwrap();

    let barrier = Arc::new(Barrier::new(N));
    let handles: Vec<_> = (0..N)
        .map(|i| {
            let barrier = barrier.clone();
            let engine = h.engine.clone();
            let id = alert.id.clone();
            thread::spawn(move || {
                barrier.wait();
                engine
                    .transition(
                        &id,
                        &AlertAction::Resolve {
                            reviewer_id: format!("rev-{i}"),
                            resolution: Resolution::Closed,
                            notes: None,
                        },
                    )
                    .is_ok()
            })
        })
        .collect();

    let wins = handles.into_iter().filter_map(|h| h.join().ok()).filter(|ok| *ok).count();
    assert_eq!(wins, 1);
    assert_eq!(h.store.get_alert(&alert.id).unwrap().status, AlertStatus::Closed);
}
