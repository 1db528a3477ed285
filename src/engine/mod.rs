//! Risk assessment engine.
//!
//! Fixed-order pipeline over an entity's active internal signals:
//! temporal decay → correlation discounting → weighted fusion → Bayesian
//! posterior → ensembling → decomposition → calibration. The output carries
//! an algorithm trace sufficient to re-derive the score from the inputs and
//! configured parameters.

pub mod bayesian;
pub mod calibration;
pub mod correlation;
pub mod decomposition;
pub mod ensemble;
pub mod fusion;
pub mod temporal;

use crate::config::Config;
use crate::db::InternalSignalStore;
use crate::models::{fmt_ts, Freshness, SeverityLevel};
use crate::outcomes::flywheel::PriorStore;
use anyhow::Result;
use bayesian::BayesianEngine;
use calibration::CalibrationEngine;
use chrono::{DateTime, Utc};
use correlation::{CorrelationEngine, SignalObservation};
use decomposition::DecompositionEngine;
use ensemble::{EnsembleEngine, ModelPrediction};
use fusion::{SignalFusionEngine, SignalInput};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use temporal::TemporalDecayEngine;
use tracing::debug;

const BAD_OUTCOME_SCORE: f64 = 70.0;

/// A factor in the assessment's explanation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentFactor {
    pub name: String,
    pub score: f64,
    pub contribution_pct: f64,
    pub explanation: String,
    pub recommendation: String,
}

/// Complete risk assessment — a value object, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub entity_type: String,
    pub entity_id: String,
    /// Final composite, 0-100.
    pub risk_score: f64,
    /// 0-1
    pub confidence: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub severity_label: SeverityLevel,
    pub is_reliable: bool,
    pub needs_human_review: bool,
    pub n_signals: usize,
    pub n_active_signals: usize,
    pub data_freshness: Freshness,
    pub primary_driver: String,
    pub factors: Vec<AssessmentFactor>,
    pub summary: String,
    pub algorithm_trace: serde_json::Value,
    pub generated_at: String,
}

/// Orchestrates the seven-stage assessment pipeline
#[derive(Clone)]
pub struct RiskEngine {
    config: Arc<Config>,
    signals: InternalSignalStore,
    priors: PriorStore,
    temporal: TemporalDecayEngine,
    correlation: CorrelationEngine,
    fusion: SignalFusionEngine,
    bayesian: BayesianEngine,
    ensemble: EnsembleEngine,
    decomposition: DecompositionEngine,
    /// Shared so the flywheel's fitted scaler is visible to assessments.
    pub calibration: Arc<RwLock<CalibrationEngine>>,
}

impl RiskEngine {
    pub fn new(config: Arc<Config>, signals: InternalSignalStore, priors: PriorStore) -> Self {
        Self {
            temporal: TemporalDecayEngine::new(&config),
            correlation: CorrelationEngine::new(&config),
            fusion: SignalFusionEngine::new(),
            bayesian: BayesianEngine::new(&config),
            ensemble: EnsembleEngine::new(),
            decomposition: DecompositionEngine::new(),
            calibration: Arc::new(RwLock::new(CalibrationEngine::new())),
            config,
            signals,
            priors,
        }
    }

    /// Full risk assessment for a single entity. Never fails on empty
    /// input: no signals yields a zero-risk assessment.
    pub fn assess_entity(
        &self,
        tenant_id: &str,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<RiskAssessment> {
        let started = Instant::now();
        let now = Utc::now();

        let signals = self
            .signals
            .active_for_entity(tenant_id, entity_type, entity_id)?;
        if signals.is_empty() {
            return Ok(self.empty_assessment(entity_type, entity_id, now));
        }

        // Stage A — temporal decay.
        let temporal_inputs: Vec<(String, f64, DateTime<Utc>)> = signals
            .iter()
            .map(|s| (s.signal_type.clone(), s.severity_score, s.created_at))
            .collect();
        let temporal_result = self.temporal.aggregate(&temporal_inputs, now);

        // Stage B — correlation discounting.
        let observations: Vec<SignalObservation> = signals
            .iter()
            .map(|s| SignalObservation {
                signal_type: s.signal_type.clone(),
                entity_id: s.entity_id.clone(),
                severity_score: s.severity_score,
            })
            .collect();
        let corr_report = self.correlation.analyze(&observations);

        let raw_scores: HashMap<String, f64> = signals
            .iter()
            .map(|s| (s.signal_type.clone(), s.severity_score))
            .collect();
        let adjusted_scores = self.correlation.apply_discount(&raw_scores, &corr_report);

        // Stage C — weighted fusion over correlation-adjusted scores.
        let fusion_inputs: Vec<SignalInput> = signals
            .iter()
            .map(|s| SignalInput {
                signal_type: s.signal_type.clone(),
                severity_score: adjusted_scores
                    .get(&s.signal_type)
                    .copied()
                    .unwrap_or(s.severity_score),
                confidence: s.confidence,
                weight: None,
            })
            .collect();
        let fusion_result = self.fusion.fuse(&fusion_inputs);

        // Stage D — Beta-Binomial posterior over decayed scores, with the
        // tenant's flywheel-updated priors when present.
        let bad_outcomes = temporal_result
            .signals
            .iter()
            .filter(|d| d.decayed_score >= BAD_OUTCOME_SCORE)
            .count();
        let good_outcomes = signals.len() - bad_outcomes;
        let (prior_alpha, prior_beta) = self
            .priors
            .active_priors(tenant_id, entity_type)?
            .unwrap_or((self.config.prior_alpha, self.config.prior_beta));
        let bayesian_result = self.bayesian.compute_risk_score(
            bad_outcomes,
            good_outcomes,
            fusion_result.fused_score,
            Some((prior_alpha, prior_beta)),
        );

        // Stage E — ensemble the two models.
        let ensemble_result = self.ensemble.aggregate(&[
            ModelPrediction {
                model_name: "weighted_fusion".to_string(),
                risk_score: fusion_result.fused_score,
                confidence: fusion_result.fused_confidence,
                weight: self.config.ensemble_weight_fusion,
            },
            ModelPrediction {
                model_name: "bayesian_posterior".to_string(),
                risk_score: bayesian_result.risk_probability * 100.0,
                confidence: bayesian_result.confidence,
                weight: self.config.ensemble_weight_bayesian,
            },
        ]);

        // Stage F — decomposition into explainable factors.
        let factor_scores: HashMap<String, f64> = fusion_result
            .factors
            .iter()
            .map(|f| (f.signal_type.clone(), f.raw_score))
            .collect();
        let factor_weights: HashMap<String, f64> = fusion_result
            .factors
            .iter()
            .map(|f| (f.signal_type.clone(), f.weight))
            .collect();
        let decomp = self.decomposition.decompose(
            entity_type,
            entity_id,
            ensemble_result.ensemble_score,
            ensemble_result.ensemble_confidence,
            &factor_scores,
            &factor_weights,
        );

        // Stage G — calibration. Advisory unless the live gate is on.
        let raw_probability = ensemble_result.ensemble_score / 100.0;
        let (risk_score, calibrated_probability) = {
            let calibration = self.calibration.read();
            if calibration.scaler.is_fitted {
                let calibrated = calibration.calibrate(raw_probability);
                if self.config.calibration_live {
                    (calibrated * 100.0, Some(calibrated))
                } else {
                    (ensemble_result.ensemble_score, Some(calibrated))
                }
            } else {
                (ensemble_result.ensemble_score, None)
            }
        };

        let severity_label = self.severity_label(risk_score);

        let mut trace = serde_json::json!({
            "fusion_score": fusion_result.fused_score,
            "fusion_confidence": fusion_result.fused_confidence,
            "bayesian_probability": bayesian_result.risk_probability,
            "bayesian_n_observations": bayesian_result.n_observations,
            "prior_alpha": prior_alpha,
            "prior_beta": prior_beta,
            "ensemble_disagreement": ensemble_result.disagreement,
            "model_scores": ensemble_result.model_scores,
            "temporal_freshness": temporal_result.freshness.as_str(),
            "n_expired_signals": temporal_result.n_expired,
            "n_correlated_pairs": corr_report.n_correlated_pairs,
        });
        if let Some(calibrated) = calibrated_probability {
            trace["calibrated_probability"] = serde_json::json!(calibrated);
        }

        let assessment = RiskAssessment {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            risk_score,
            confidence: ensemble_result.ensemble_confidence,
            ci_lower: ensemble_result.ci_lower,
            ci_upper: ensemble_result.ci_upper,
            severity_label,
            is_reliable: bayesian_result.is_reliable,
            needs_human_review: ensemble_result.needs_human_review,
            n_signals: signals.len(),
            n_active_signals: temporal_result.n_active,
            data_freshness: temporal_result.freshness,
            primary_driver: decomp.primary_driver.clone(),
            factors: decomp
                .factors
                .iter()
                .map(|f| AssessmentFactor {
                    name: f.display_name.clone(),
                    score: f.score,
                    contribution_pct: f.contribution_pct,
                    explanation: f.explanation.clone(),
                    recommendation: f.recommendation.clone(),
                })
                .collect(),
            summary: decomp.summary,
            algorithm_trace: trace,
            generated_at: fmt_ts(now),
        };

        metrics::histogram!(
            "riskcast_assessment_latency_seconds",
            started.elapsed().as_secs_f64()
        );
        debug!(
            entity = %format!("{entity_type}/{entity_id}"),
            risk_score,
            n_signals = assessment.n_signals,
            "entity assessed"
        );

        Ok(assessment)
    }

    fn severity_label(&self, score: f64) -> SeverityLevel {
        if score >= self.config.severity_critical_threshold {
            SeverityLevel::Critical
        } else if score >= self.config.severity_high_threshold {
            SeverityLevel::High
        } else if score >= self.config.severity_moderate_threshold {
            SeverityLevel::Moderate
        } else {
            SeverityLevel::Low
        }
    }

    fn empty_assessment(
        &self,
        entity_type: &str,
        entity_id: &str,
        now: DateTime<Utc>,
    ) -> RiskAssessment {
        RiskAssessment {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            risk_score: 0.0,
            confidence: 0.0,
            ci_lower: 0.0,
            ci_upper: 0.0,
            severity_label: SeverityLevel::Low,
            is_reliable: false,
            needs_human_review: false,
            n_signals: 0,
            n_active_signals: 0,
            data_freshness: Freshness::Stale,
            primary_driver: "none".to_string(),
            factors: vec![],
            summary: "No signals available for this entity. Import data or run a scan."
                .to_string(),
            algorithm_trace: serde_json::json!({}),
            generated_at: fmt_ts(now),
        }
    }
}
