//! Stage E — model ensembling with disagreement detection.
//!
//! Combines the fusion score and the Bayesian posterior into one score.
//! When the models disagree strongly, the assessment is flagged for human
//! review rather than papering over the uncertainty.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use tracing::warn;

const DISAGREEMENT_THRESHOLD: f64 = 15.0;
const HIGH_DISAGREEMENT_THRESHOLD: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisagreementLevel {
    Low,
    Moderate,
    High,
}

/// A single model's prediction
#[derive(Debug, Clone)]
pub struct ModelPrediction {
    pub model_name: String,
    /// 0-100
    pub risk_score: f64,
    /// 0-1
    pub confidence: f64,
    pub weight: f64,
}

/// Output of ensemble aggregation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleResult {
    pub ensemble_score: f64,
    pub ensemble_confidence: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub n_models: usize,
    pub model_scores: BTreeMap<String, f64>,
    /// Standard deviation of the model scores.
    pub disagreement: f64,
    pub disagreement_level: DisagreementLevel,
    pub needs_human_review: bool,
    pub dominant_model: String,
}

/// Confidence-weighted model ensemble
#[derive(Debug, Clone, Default)]
pub struct EnsembleEngine;

impl EnsembleEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn aggregate(&self, predictions: &[ModelPrediction]) -> EnsembleResult {
        if predictions.is_empty() {
            return EnsembleResult {
                ensemble_score: 0.0,
                ensemble_confidence: 0.0,
                ci_lower: 0.0,
                ci_upper: 0.0,
                n_models: 0,
                model_scores: BTreeMap::new(),
                disagreement: 0.0,
                disagreement_level: DisagreementLevel::Low,
                needs_human_review: false,
                dominant_model: "none".to_string(),
            };
        }

        let total_weight: f64 = predictions.iter().map(|p| p.weight * p.confidence).sum();
        let ensemble_score = if total_weight > 0.0 {
            predictions
                .iter()
                .map(|p| p.weight * p.confidence * p.risk_score)
                .sum::<f64>()
                / total_weight
        } else {
            predictions.iter().map(|p| p.risk_score).sum::<f64>() / predictions.len() as f64
        };

        let conf_weights: f64 = predictions.iter().map(|p| p.weight).sum();
        let ensemble_confidence = if conf_weights > 0.0 {
            predictions
                .iter()
                .map(|p| p.weight * p.confidence)
                .sum::<f64>()
                / conf_weights
        } else {
            0.0
        };

        let scores: Vec<f64> = predictions.iter().map(|p| p.risk_score).collect();
        let disagreement = if scores.len() > 1 {
            scores.iter().copied().std_dev()
        } else {
            0.0
        };

        let disagreement_level = if disagreement >= HIGH_DISAGREEMENT_THRESHOLD {
            DisagreementLevel::High
        } else if disagreement >= DISAGREEMENT_THRESHOLD {
            DisagreementLevel::Moderate
        } else {
            DisagreementLevel::Low
        };
        let needs_human_review = disagreement_level == DisagreementLevel::High;

        let (ci_lower, ci_upper) = if scores.len() > 1 {
            (
                (ensemble_score - 2.0 * disagreement).max(0.0),
                (ensemble_score + 2.0 * disagreement).min(100.0),
            )
        } else {
            let unc = scores[0] * (1.0 - predictions[0].confidence);
            (
                (ensemble_score - unc).max(0.0),
                (ensemble_score + unc).min(100.0),
            )
        };

        let dominant = predictions
            .iter()
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|p| p.model_name.clone())
            .unwrap_or_else(|| "none".to_string());

        let model_scores: BTreeMap<String, f64> = predictions
            .iter()
            .map(|p| (p.model_name.clone(), p.risk_score))
            .collect();

        if needs_human_review {
            warn!(
                disagreement,
                ?model_scores,
                "ensemble models disagree strongly"
            );
        }

        EnsembleResult {
            ensemble_score,
            ensemble_confidence,
            ci_lower,
            ci_upper,
            n_models: predictions.len(),
            model_scores,
            disagreement,
            disagreement_level,
            needs_human_review,
            dominant_model: dominant,
        }
    }
}
