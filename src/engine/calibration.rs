//! Stage G — confidence calibration.
//!
//! Advisory during scoring: the assessment endpoint keeps returning the raw
//! ensemble probability unless the live-calibration gate is on. Offline, the
//! engine measures calibration (ECE, MCE, Brier, reliability bins) from
//! outcome data and can fit a Platt scaler.
//!
//! Goal: when the system says "80% confident", the event occurs ~80% of the
//! time.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const N_CALIBRATION_BINS: usize = 10;
const MIN_SAMPLES_FOR_CALIBRATION: usize = 30;

/// A single bin in a reliability diagram
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub bin_lower: f64,
    pub bin_upper: f64,
    pub avg_predicted: f64,
    pub avg_actual: f64,
    pub count: usize,
    pub gap: f64,
}

/// Full calibration assessment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// Expected calibration error; 0 = perfect.
    pub ece: f64,
    /// Maximum calibration error across bins.
    pub mce: f64,
    pub brier_score: f64,
    pub bins: Vec<CalibrationBin>,
    pub n_predictions: usize,
    pub is_calibrated: bool,
    pub overconfident: bool,
    pub underconfident: bool,
    pub recommendation: String,
}

/// Platt scaling: P_cal = sigmoid(A·logit(P_raw) + B), fitted by gradient
/// descent on log-loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlattScaler {
    pub a: f64,
    pub b: f64,
    pub is_fitted: bool,
}

impl Default for PlattScaler {
    fn default() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            is_fitted: false,
        }
    }
}

impl PlattScaler {
    pub fn fit(&mut self, predicted: &[f64], actual: &[u8]) {
        if predicted.len() < MIN_SAMPLES_FOR_CALIBRATION {
            warn!(
                n_samples = predicted.len(),
                required = MIN_SAMPLES_FOR_CALIBRATION,
                "insufficient data to fit calibration scaler"
            );
            return;
        }

        let learning_rate = 0.01;
        let n_iterations = 100;
        let n = predicted.len() as f64;
        let mut a = 1.0f64;
        let mut b = 0.0f64;

        for _ in 0..n_iterations {
            let mut grad_a = 0.0;
            let mut grad_b = 0.0;
            for (&p, &y) in predicted.iter().zip(actual.iter()) {
                let p_clipped = p.clamp(1e-7, 1.0 - 1e-7);
                let logit = (p_clipped / (1.0 - p_clipped)).ln();
                let z = a * logit + b;
                let sigmoid = 1.0 / (1.0 + (-z).exp());
                let error = sigmoid - y as f64;
                grad_a += error * logit / n;
                grad_b += error / n;
            }
            a -= learning_rate * grad_a;
            b -= learning_rate * grad_b;
        }

        self.a = a;
        self.b = b;
        self.is_fitted = true;
        info!(a, b, "platt scaler fitted");
    }

    /// Identity until fitted.
    pub fn calibrate(&self, raw_probability: f64) -> f64 {
        if !self.is_fitted {
            return raw_probability;
        }
        let p_clipped = raw_probability.clamp(1e-7, 1.0 - 1e-7);
        let logit = (p_clipped / (1.0 - p_clipped)).ln();
        let z = self.a * logit + self.b;
        1.0 / (1.0 + (-z).exp())
    }
}

/// Assesses and improves probability calibration
#[derive(Debug, Clone, Default)]
pub struct CalibrationEngine {
    pub scaler: PlattScaler,
}

impl CalibrationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// ECE/MCE/Brier over (predicted probability, binary outcome) pairs
    /// using 10 equal-width bins.
    pub fn assess(&self, predicted: &[f64], actual: &[u8]) -> CalibrationReport {
        let n = predicted.len();
        if n == 0 {
            return CalibrationReport {
                ece: 0.0,
                mce: 0.0,
                brier_score: 0.0,
                bins: vec![],
                n_predictions: 0,
                is_calibrated: false,
                overconfident: false,
                underconfident: false,
                recommendation: "No predictions to calibrate.".to_string(),
            };
        }

        let bin_width = 1.0 / N_CALIBRATION_BINS as f64;
        let mut bins: Vec<CalibrationBin> = Vec::with_capacity(N_CALIBRATION_BINS);
        let mut ece = 0.0;
        let mut mce: f64 = 0.0;
        let mut total_over = 0.0;
        let mut total_under = 0.0;

        for i in 0..N_CALIBRATION_BINS {
            let lower = i as f64 * bin_width;
            let upper = (i + 1) as f64 * bin_width;
            let last_bin = i == N_CALIBRATION_BINS - 1;

            let members: Vec<usize> = (0..n)
                .filter(|&j| {
                    let p = predicted[j];
                    (p >= lower && p < upper) || (last_bin && p == 1.0)
                })
                .collect();

            if members.is_empty() {
                bins.push(CalibrationBin {
                    bin_lower: lower,
                    bin_upper: upper,
                    avg_predicted: 0.0,
                    avg_actual: 0.0,
                    count: 0,
                    gap: 0.0,
                });
                continue;
            }

            let count = members.len();
            let avg_pred = members.iter().map(|&j| predicted[j]).sum::<f64>() / count as f64;
            let avg_act =
                members.iter().map(|&j| actual[j] as f64).sum::<f64>() / count as f64;
            let gap = (avg_pred - avg_act).abs();

            ece += gap * count as f64 / n as f64;
            mce = mce.max(gap);
            if avg_pred > avg_act {
                total_over += gap * count as f64;
            } else {
                total_under += gap * count as f64;
            }

            bins.push(CalibrationBin {
                bin_lower: lower,
                bin_upper: upper,
                avg_predicted: avg_pred,
                avg_actual: avg_act,
                count,
                gap,
            });
        }

        let brier = predicted
            .iter()
            .zip(actual.iter())
            .map(|(&p, &y)| (p - y as f64).powi(2))
            .sum::<f64>()
            / n as f64;

        let is_calibrated = ece < 0.05;
        let overconfident = total_over > total_under * 1.5;
        let underconfident = total_under > total_over * 1.5;

        let recommendation = if is_calibrated {
            "Predictions are well-calibrated. Continue monitoring.".to_string()
        } else if overconfident {
            format!(
                "System is overconfident (ECE={ece:.3}). \
                 Consider applying Platt scaling to reduce confidence scores."
            )
        } else if underconfident {
            format!("System is underconfident (ECE={ece:.3}). Consider recalibrating upward.")
        } else {
            format!(
                "Calibration needs improvement (ECE={ece:.3}). \
                 Collect more outcome data and retrain."
            )
        };

        CalibrationReport {
            ece,
            mce,
            brier_score: brier,
            bins,
            n_predictions: n,
            is_calibrated,
            overconfident,
            underconfident,
            recommendation,
        }
    }

    pub fn fit_scaler(&mut self, predicted: &[f64], actual: &[u8]) {
        self.scaler.fit(predicted, actual);
    }

    pub fn calibrate(&self, raw_probability: f64) -> f64 {
        self.scaler.calibrate(raw_probability)
    }
}
