//! Counterfactual scenario generation.
//!
//! What-if scenarios around an assessment: full materialization, improving
//! conditions, partial impact, and (for high scores) cascade failure.

use crate::engine::RiskAssessment;
use serde::{Deserialize, Serialize};

/// A what-if scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterfactualScenario {
    pub scenario_name: String,
    pub description: String,
    /// 0-1
    pub probability: f64,
    /// 0-100
    pub impact_if_occurs: f64,
    pub expected_loss: f64,
    pub mitigation_available: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CounterfactualEngine;

impl CounterfactualEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn generate_scenarios(
        &self,
        assessment: &RiskAssessment,
        exposure_usd: f64,
    ) -> Vec<CounterfactualScenario> {
        let risk_prob = assessment.risk_score / 100.0;
        let severity = assessment.risk_score;
        let mut scenarios = Vec::with_capacity(4);

        scenarios.push(CounterfactualScenario {
            scenario_name: "Risk Materializes".to_string(),
            description: format!(
                "The identified risk fully materializes. Expected impact: severity {severity:.0}/100."
            ),
            probability: risk_prob,
            impact_if_occurs: (severity * 1.2).min(100.0),
            expected_loss: exposure_usd * risk_prob,
            mitigation_available: true,
        });

        let improve_prob = (1.0 - risk_prob - 0.1).max(0.05);
        scenarios.push(CounterfactualScenario {
            scenario_name: "Conditions Improve".to_string(),
            description: "External conditions improve, reducing the risk significantly."
                .to_string(),
            probability: improve_prob,
            impact_if_occurs: (severity * 0.3).max(0.0),
            expected_loss: exposure_usd * improve_prob * 0.1,
            mitigation_available: false,
        });

        let partial_prob = (risk_prob * 1.5).min(0.5);
        scenarios.push(CounterfactualScenario {
            scenario_name: "Partial Impact".to_string(),
            description: "Risk partially materializes with moderate consequences.".to_string(),
            probability: partial_prob,
            impact_if_occurs: severity * 0.6,
            expected_loss: exposure_usd * partial_prob * 0.3,
            mitigation_available: true,
        });

        if assessment.risk_score >= 60.0 {
            scenarios.push(CounterfactualScenario {
                scenario_name: "Cascade Failure".to_string(),
                description: "Risk triggers a cascade of related failures \
                              (port closure, supply chain disruption, customer loss)."
                    .to_string(),
                probability: risk_prob * 0.3,
                impact_if_occurs: (severity * 2.0).min(100.0),
                expected_loss: 1.5 * exposure_usd * 0.3 * risk_prob,
                mitigation_available: true,
            });
        }

        scenarios
    }
}
