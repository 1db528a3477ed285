//! Prediction-vs-actual accuracy metrics.
//!
//! Brier score, mean absolute error, accuracy rate, calibration drift (ECE
//! over 10 equal-width bins), and a confusion matrix partitioned at a
//! predicted score of 50. All metrics come from recorded outcomes.

use crate::models::fmt_ts;
use crate::outcomes::recorder::{OutcomeRecord, OutcomeStore};
use anyhow::Result;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

const MIN_OUTCOMES_FOR_METRICS: usize = 10;
const N_CALIBRATION_BINS: usize = 10;

/// Accuracy report over a period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub period: String,
    pub generated_at: String,
    pub total_decisions: usize,
    pub total_outcomes: usize,
    pub coverage: f64,

    pub brier_score: f64,
    pub mean_absolute_error: f64,
    pub accuracy_rate: f64,
    /// ECE between predicted probability and observed frequency.
    pub calibration_drift: f64,
    pub overconfident: bool,
    pub underconfident: bool,

    pub true_positives: usize,
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,

    pub recommendation: String,
}

/// Computes prediction accuracy metrics from recorded outcomes
#[derive(Clone)]
pub struct AccuracyCalculator {
    store: OutcomeStore,
}

impl AccuracyCalculator {
    pub fn new(store: OutcomeStore) -> Self {
        Self { store }
    }

    pub fn generate_report(&self, tenant_id: &str, days_back: i64) -> Result<AccuracyReport> {
        let now = Utc::now();
        let period = format!("last_{days_back}_days");
        let since = now - Duration::days(days_back);
        let outcomes = self.store.fetch_since(tenant_id, None, since)?;
        let total_outcomes = outcomes.len();

        if total_outcomes < MIN_OUTCOMES_FOR_METRICS {
            return Ok(AccuracyReport {
                period,
                generated_at: fmt_ts(now),
                total_decisions: total_outcomes,
                total_outcomes,
                coverage: 0.0,
                brier_score: 0.0,
                mean_absolute_error: 0.0,
                accuracy_rate: 0.0,
                calibration_drift: 0.0,
                overconfident: false,
                underconfident: false,
                true_positives: 0,
                true_negatives: 0,
                false_positives: 0,
                false_negatives: 0,
                precision: 0.0,
                recall: 0.0,
                f1_score: 0.0,
                recommendation: format!(
                    "Only {total_outcomes} outcomes recorded. Need at least \
                     {MIN_OUTCOMES_FOR_METRICS} for reliable metrics — \
                     keep recording outcomes, more data needed."
                ),
            });
        }

        let brier_score = compute_brier(&outcomes);
        let mae = outcomes.iter().map(|o| o.prediction_error).sum::<f64>()
            / total_outcomes as f64;
        let accuracy_rate = outcomes.iter().filter(|o| o.was_accurate).count() as f64
            / total_outcomes as f64;
        let calibration_drift = compute_ece(&outcomes);

        // Directional bias for the drift.
        let avg_predicted = outcomes
            .iter()
            .map(|o| o.predicted_risk_score / 100.0)
            .sum::<f64>()
            / total_outcomes as f64;
        let observed_rate = outcomes.iter().filter(|o| o.risk_materialized).count() as f64
            / total_outcomes as f64;
        let overconfident = avg_predicted > observed_rate + 0.05;
        let underconfident = observed_rate > avg_predicted + 0.05;

        let (tp, tn, fp, fn_) = confusion_matrix(&outcomes);
        let precision = tp as f64 / (tp + fp).max(1) as f64;
        let recall = tp as f64 / (tp + fn_).max(1) as f64;
        let f1_score = 2.0 * precision * recall / (precision + recall).max(1e-9);

        let recommendation = build_recommendation(
            brier_score,
            accuracy_rate,
            calibration_drift,
            overconfident,
            underconfident,
        );

        let report = AccuracyReport {
            period,
            generated_at: fmt_ts(now),
            total_decisions: total_outcomes,
            total_outcomes,
            coverage: 1.0,
            brier_score,
            mean_absolute_error: mae,
            accuracy_rate,
            calibration_drift,
            overconfident,
            underconfident,
            true_positives: tp,
            true_negatives: tn,
            false_positives: fp,
            false_negatives: fn_,
            precision,
            recall,
            f1_score,
            recommendation,
        };

        info!(
            tenant_id = %tenant_id,
            brier_score,
            accuracy_rate,
            calibration_drift,
            total_outcomes,
            "accuracy report generated"
        );

        Ok(report)
    }
}

/// Brier = mean((predicted_score/100 − 1{materialized})²)
fn compute_brier(outcomes: &[OutcomeRecord]) -> f64 {
    outcomes
        .iter()
        .map(|o| {
            let p = o.predicted_risk_score / 100.0;
            let actual = if o.risk_materialized { 1.0 } else { 0.0 };
            (p - actual).powi(2)
        })
        .sum::<f64>()
        / outcomes.len().max(1) as f64
}

/// ECE over 10 equal-width bins of predicted probability.
fn compute_ece(outcomes: &[OutcomeRecord]) -> f64 {
    let n = outcomes.len();
    let mut bins: Vec<Vec<(f64, f64)>> = vec![Vec::new(); N_CALIBRATION_BINS];
    for o in outcomes {
        let p = o.predicted_risk_score / 100.0;
        let idx = ((p * N_CALIBRATION_BINS as f64) as usize).min(N_CALIBRATION_BINS - 1);
        bins[idx].push((p, if o.risk_materialized { 1.0 } else { 0.0 }));
    }

    let mut ece = 0.0;
    for members in &bins {
        if members.is_empty() {
            continue;
        }
        let count = members.len() as f64;
        let avg_pred = members.iter().map(|(p, _)| p).sum::<f64>() / count;
        let avg_act = members.iter().map(|(_, a)| a).sum::<f64>() / count;
        ece += (count / n as f64) * (avg_pred - avg_act).abs();
    }
    ece
}

/// Partition at predicted_score ≥ 50 vs risk_materialized.
fn confusion_matrix(outcomes: &[OutcomeRecord]) -> (usize, usize, usize, usize) {
    let mut tp = 0;
    let mut tn = 0;
    let mut fp = 0;
    let mut fn_ = 0;
    for o in outcomes {
        let predicted_high = o.predicted_risk_score >= 50.0;
        match (predicted_high, o.risk_materialized) {
            (true, true) => tp += 1,
            (false, false) => tn += 1,
            (true, false) => fp += 1,
            (false, true) => fn_ += 1,
        }
    }
    (tp, tn, fp, fn_)
}

fn build_recommendation(
    brier: f64,
    accuracy_rate: f64,
    drift: f64,
    overconfident: bool,
    underconfident: bool,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if brier < 0.1 {
        parts.push("Brier score is excellent (<0.1).".to_string());
    } else if brier < 0.2 {
        parts.push("Brier score is good (<0.2), minor calibration improvements possible.".to_string());
    } else {
        parts.push(format!(
            "Brier score is {brier:.3}, recalibrating the model is advised."
        ));
    }

    if accuracy_rate >= 0.8 {
        parts.push(format!("Accuracy rate is strong at {:.0}%.", accuracy_rate * 100.0));
    } else if accuracy_rate >= 0.6 {
        parts.push(format!(
            "Accuracy rate is moderate at {:.0}%.",
            accuracy_rate * 100.0
        ));
    } else {
        parts.push(format!(
            "Accuracy rate is low at {:.0}%, model retraining recommended.",
            accuracy_rate * 100.0
        ));
    }

    if drift > 0.15 {
        if overconfident {
            parts.push(format!(
                "Calibration drift is {drift:.3} and predictions run hot — \
                 consider applying Platt scaling to reduce confidence scores."
            ));
        } else if underconfident {
            parts.push(format!(
                "Calibration drift is {drift:.3} and predictions run cold — \
                 consider recalibrating upward."
            ));
        } else {
            parts.push(format!(
                "Calibration drift is {drift:.3}, flywheel recalibration recommended."
            ));
        }
    }

    parts.join(" ")
}
