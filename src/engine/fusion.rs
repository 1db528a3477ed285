//! Stage C — weighted confidence fusion.
//!
//! fused = Σ(w·c·s) / Σ(w·c), so low-confidence signals pull less weight.
//! Per-signal uncertainty u = w·s·(1-c) propagates through root-sum-squares
//! into the confidence interval.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub fn default_weights() -> HashMap<String, f64> {
    HashMap::from([
        ("payment_risk".to_string(), 0.30),
        ("route_disruption".to_string(), 0.25),
        ("order_risk_composite".to_string(), 0.20),
        ("customer_creditworthiness".to_string(), 0.15),
        ("market_volatility".to_string(), 0.10),
    ])
}

const FALLBACK_WEIGHT: f64 = 0.1;

/// A single signal to be fused
#[derive(Debug, Clone)]
pub struct SignalInput {
    pub signal_type: String,
    /// 0-100, correlation-adjusted.
    pub severity_score: f64,
    /// 0-1
    pub confidence: f64,
    /// Overrides the configured weight when set.
    pub weight: Option<f64>,
}

/// How a single factor contributed to the fused score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionFactor {
    pub signal_type: String,
    pub raw_score: f64,
    pub confidence: f64,
    pub weight: f64,
    pub weighted_contribution: f64,
    pub pct_contribution: f64,
}

/// Output of multi-factor fusion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedRiskScore {
    pub fused_score: f64,
    pub fused_confidence: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub n_signals: usize,
    pub factors: Vec<FusionFactor>,
}

impl FusedRiskScore {
    /// The single factor contributing most to the fused score.
    pub fn dominant_factor(&self) -> Option<&FusionFactor> {
        self.factors.iter().max_by(|a, b| {
            a.pct_contribution
                .partial_cmp(&b.pct_contribution)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}

/// Multi-factor fusion with per-tenant weight overrides
#[derive(Debug, Clone)]
pub struct SignalFusionEngine {
    weights: HashMap<String, f64>,
}

impl SignalFusionEngine {
    pub fn new() -> Self {
        Self {
            weights: default_weights(),
        }
    }

    /// Apply overrides and renormalize so weights sum to 1.
    pub fn with_overrides(overrides: &HashMap<String, f64>) -> Self {
        let mut weights = default_weights();
        for (k, v) in overrides {
            weights.insert(k.clone(), *v);
        }
        let total: f64 = weights.values().sum();
        if total > 0.0 {
            for v in weights.values_mut() {
                *v /= total;
            }
        }
        Self { weights }
    }

    fn weight_for(&self, input: &SignalInput) -> f64 {
        input
            .weight
            .unwrap_or_else(|| self.weights.get(&input.signal_type).copied().unwrap_or(FALLBACK_WEIGHT))
    }

    pub fn fuse(&self, signals: &[SignalInput]) -> FusedRiskScore {
        if signals.is_empty() {
            return FusedRiskScore {
                fused_score: 0.0,
                fused_confidence: 0.0,
                ci_lower: 0.0,
                ci_upper: 0.0,
                n_signals: 0,
                factors: vec![],
            };
        }

        let mut weighted_sum = 0.0;
        let mut weight_conf_sum = 0.0;
        let mut factors: Vec<FusionFactor> = Vec::with_capacity(signals.len());

        for sig in signals {
            let w = self.weight_for(sig);
            let contribution = w * sig.confidence * sig.severity_score;
            weighted_sum += contribution;
            weight_conf_sum += w * sig.confidence;
            factors.push(FusionFactor {
                signal_type: sig.signal_type.clone(),
                raw_score: sig.severity_score,
                confidence: sig.confidence,
                weight: w,
                weighted_contribution: contribution,
                pct_contribution: 0.0,
            });
        }

        let fused_score = if weight_conf_sum > 0.0 {
            weighted_sum / weight_conf_sum
        } else {
            0.0
        };

        let total_contribution: f64 = factors.iter().map(|f| f.weighted_contribution).sum();
        if total_contribution > 0.0 {
            for f in &mut factors {
                f.pct_contribution = f.weighted_contribution / total_contribution * 100.0;
            }
        }

        // Composite confidence: weight-weighted average of confidences.
        let total_weight: f64 = signals.iter().map(|s| self.weight_for(s)).sum();
        let fused_confidence = if total_weight > 0.0 {
            signals
                .iter()
                .map(|s| self.weight_for(s) * s.confidence)
                .sum::<f64>()
                / total_weight
        } else {
            0.0
        };

        let combined_uncertainty = signals
            .iter()
            .map(|s| {
                let u = self.weight_for(s) * s.severity_score * (1.0 - s.confidence);
                u * u
            })
            .sum::<f64>()
            .sqrt();

        FusedRiskScore {
            fused_score,
            fused_confidence,
            ci_lower: (fused_score - combined_uncertainty).max(0.0),
            ci_upper: (fused_score + combined_uncertainty).min(100.0),
            n_signals: signals.len(),
            factors,
        }
    }
}

impl Default for SignalFusionEngine {
    fn default() -> Self {
        Self::new()
    }
}
