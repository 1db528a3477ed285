//! Outcome loop scenarios: calibration drift detection and the flywheel's
//! prior updates feeding back into the engine.

mod common;

use common::{seed_internal_signal, services};
use riskcast_backend::errors::ApiError;
use riskcast_backend::outcomes::recorder::{
    OutcomeRecordRequest, OutcomeType, PredictedSnapshot,
};

const TENANT: &str = "dev-tenant";

fn snapshot(risk_score: f64) -> PredictedSnapshot {
    PredictedSnapshot {
        entity_type: "order".to_string(),
        entity_id: "ORD-42".to_string(),
        risk_score,
        confidence: 0.85,
        loss_usd: 25_000.0,
        action: "insure".to_string(),
    }
}

fn request(decision_id: &str, outcome_type: OutcomeType) -> OutcomeRecordRequest {
    OutcomeRecordRequest {
        decision_id: decision_id.to_string(),
        outcome_type,
        actual_loss_usd: 0.0,
        actual_delay_days: 0.0,
        action_taken: "monitor_only".to_string(),
        action_followed_recommendation: false,
        action_cost_usd: 0.0,
        notes: None,
    }
}

#[test]
fn test_calibration_drift_scenario() {
    let svc = services();

    // Ten outcomes, every prediction at 90, only one materialized.
    for i in 0..9 {
        svc.outcome_recorder
            .record(TENANT, &request(&format!("dec_{i}"), OutcomeType::NoImpact), &snapshot(90.0), None)
            .unwrap();
    }
    svc.outcome_recorder
        .record(TENANT, &request("dec_9", OutcomeType::LossOccurred), &snapshot(90.0), None)
        .unwrap();

    let report = svc.accuracy.generate_report(TENANT, 30).unwrap();
    assert!(report.brier_score > 0.7);
    assert!(report.calibration_drift > 0.7);
    assert!(report.overconfident);
    assert!(report
        .recommendation
        .contains("consider applying Platt scaling"));

    // Flywheel on the same stream: recalibration flagged, alpha shrinks.
    let state = svc
        .flywheel
        .compute_updated_priors(TENANT, "order", 90)
        .unwrap();
    assert!(state.needs_recalibration);
    assert!(state.updated_alpha < state.prior_alpha);
}

#[test]
fn test_outcome_write_once() {
    let svc = services();
    let original = svc
        .outcome_recorder
        .record(TENANT, &request("dec_once", OutcomeType::NoImpact), &snapshot(60.0), None)
        .unwrap();

    // Re-recording conflicts and leaves the stored record unchanged.
    let mut second = request("dec_once", OutcomeType::LossOccurred);
    second.actual_loss_usd = 123_456.0;
    let err = svc
        .outcome_recorder
        .record(TENANT, &second, &snapshot(60.0), None)
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict { .. }));

    let stored = svc
        .outcomes
        .get_by_decision(TENANT, "dec_once")
        .unwrap()
        .unwrap();
    assert_eq!(stored.outcome_id, original.outcome_id);
    assert_eq!(stored.outcome_type, OutcomeType::NoImpact);
    assert_eq!(stored.actual_loss_usd, 0.0);
}

#[test]
fn test_flywheel_priors_feed_next_assessment() {
    let svc = services();
    seed_internal_signal(&svc.db, TENANT, "order", "ORD-42", "payment_risk", 60.0, 0.8, 4);

    let before = svc
        .risk_engine
        .assess_entity(TENANT, "order", "ORD-42")
        .unwrap();

    // A run of materialized outcomes pushes the prior up.
    for i in 0..10 {
        svc.outcome_recorder
            .record(TENANT, &request(&format!("dec_fw_{i}"), OutcomeType::LossOccurred), &snapshot(90.0), None)
            .unwrap();
    }
    let state = svc
        .flywheel
        .compute_updated_priors(TENANT, "order", 90)
        .unwrap();
    svc.flywheel.apply(TENANT, &state).unwrap();

    let after = svc
        .risk_engine
        .assess_entity(TENANT, "order", "ORD-42")
        .unwrap();
    let p_before = before.algorithm_trace["bayesian_probability"].as_f64().unwrap();
    let p_after = after.algorithm_trace["bayesian_probability"].as_f64().unwrap();
    assert!(p_after > p_before);
}

#[test]
fn test_roi_report_totals() {
    let svc = services();

    let mut followed = request("dec_roi_1", OutcomeType::LossAvoided);
    followed.action_followed_recommendation = true;
    followed.action_cost_usd = 2_000.0;
    svc.outcome_recorder
        .record(TENANT, &followed, &snapshot(70.0), None)
        .unwrap();

    let mut ignored = request("dec_roi_2", OutcomeType::LossOccurred);
    ignored.actual_loss_usd = 10_000.0;
    svc.outcome_recorder
        .record(TENANT, &ignored, &snapshot(70.0), None)
        .unwrap();

    let report = svc.roi.generate_report(TENANT, 30).unwrap();
    assert_eq!(report.decisions_with_outcomes, 2);
    // +25k avoided, -10k ignored loss.
    assert_eq!(report.net_value_generated_usd, 15_000.0);
    assert_eq!(report.total_action_cost_usd, 2_000.0);
    assert_eq!(report.recommendation_follow_rate, 0.5);
}

#[test]
fn test_outcomes_are_tenant_scoped() {
    let svc = services();
    svc.outcome_recorder
        .record("tenant-a", &request("dec_iso", OutcomeType::NoImpact), &snapshot(50.0), None)
        .unwrap();

    assert!(svc
        .outcomes
        .get_by_decision("tenant-b", "dec_iso")
        .unwrap()
        .is_none());
    assert!(svc.outcomes.list("tenant-b", 50, 0).unwrap().is_empty());
}
