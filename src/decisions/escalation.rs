//! Escalation rules.
//!
//! Five rules decide when a decision needs human review: high exposure, low
//! confidence, critical risk score, model disagreement, insufficient data.
//! Every rule is reported with its threshold and actual value, triggered or
//! not, so reviewers can see how close each call was.

use crate::config::Config;
use crate::engine::RiskAssessment;
use serde::{Deserialize, Serialize};
use tracing::info;

/// One evaluated escalation rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRule {
    pub rule_name: String,
    pub triggered: bool,
    pub reason: String,
    pub threshold: Option<f64>,
    pub actual_value: f64,
}

/// Result of evaluating all rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationOutcome {
    pub needs_escalation: bool,
    pub rules: Vec<EscalationRule>,
    pub reason_summary: String,
}

#[derive(Debug, Clone)]
pub struct EscalationEngine {
    exposure_threshold: f64,
    confidence_floor: f64,
    risk_score_ceiling: f64,
    disagreement_threshold: f64,
}

impl EscalationEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            exposure_threshold: config.escalation_exposure_threshold,
            confidence_floor: config.escalation_confidence_floor,
            risk_score_ceiling: config.escalation_risk_ceiling,
            disagreement_threshold: config.escalation_disagreement_threshold,
        }
    }

    pub fn evaluate(&self, assessment: &RiskAssessment, exposure_usd: f64) -> EscalationOutcome {
        let disagreement = assessment
            .algorithm_trace
            .get("ensemble_disagreement")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);

        let rules = vec![
            EscalationRule {
                rule_name: "high_exposure".to_string(),
                triggered: exposure_usd >= self.exposure_threshold,
                reason: format!(
                    "Exposure ${exposure_usd:.0} vs threshold ${:.0}",
                    self.exposure_threshold
                ),
                threshold: Some(self.exposure_threshold),
                actual_value: exposure_usd,
            },
            EscalationRule {
                rule_name: "low_confidence".to_string(),
                triggered: assessment.confidence < self.confidence_floor,
                reason: format!(
                    "Confidence {:.2} vs floor {:.2}",
                    assessment.confidence, self.confidence_floor
                ),
                threshold: Some(self.confidence_floor),
                actual_value: assessment.confidence,
            },
            EscalationRule {
                rule_name: "critical_risk_score".to_string(),
                triggered: assessment.risk_score >= self.risk_score_ceiling,
                reason: format!(
                    "Risk score {:.0} vs ceiling {:.0}",
                    assessment.risk_score, self.risk_score_ceiling
                ),
                threshold: Some(self.risk_score_ceiling),
                actual_value: assessment.risk_score,
            },
            EscalationRule {
                rule_name: "model_disagreement".to_string(),
                triggered: disagreement >= self.disagreement_threshold,
                reason: format!(
                    "Model disagreement {disagreement:.1} vs threshold {:.1}",
                    self.disagreement_threshold
                ),
                threshold: Some(self.disagreement_threshold),
                actual_value: disagreement,
            },
            EscalationRule {
                rule_name: "insufficient_data".to_string(),
                triggered: !assessment.is_reliable,
                reason: "Assessment is based on insufficient data".to_string(),
                threshold: None,
                actual_value: assessment.n_signals as f64,
            },
        ];

        let triggered: Vec<&str> = rules
            .iter()
            .filter(|r| r.triggered)
            .map(|r| r.rule_name.as_str())
            .collect();
        let needs_escalation = !triggered.is_empty();

        let reason_summary = if needs_escalation {
            format!("Escalated: {}", triggered.join("; "))
        } else {
            "No escalation rules triggered".to_string()
        };

        if needs_escalation {
            info!(
                entity = %format!("{}/{}", assessment.entity_type, assessment.entity_id),
                rules = ?triggered,
                "decision escalated"
            );
        }

        EscalationOutcome {
            needs_escalation,
            rules,
            reason_summary,
        }
    }
}
