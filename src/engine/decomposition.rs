//! Stage F — risk decomposition.
//!
//! Breaks a composite score into explainable factors, each with a
//! contribution percentage, a plain-language explanation, and a
//! recommendation. Every score must answer "why is this entity at risk?".

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single factor contributing to an entity's risk score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor_name: String,
    pub display_name: String,
    pub score: f64,
    pub weight: f64,
    pub contribution_pct: f64,
    pub explanation: String,
    pub recommendation: String,
}

/// Full decomposition of a composite score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskDecomposition {
    pub entity_type: String,
    pub entity_id: String,
    pub composite_score: f64,
    pub confidence: f64,
    pub factors: Vec<RiskFactor>,
    pub primary_driver: String,
    pub summary: String,
}

struct FactorTemplate {
    display_name: &'static str,
    explanation_high: &'static str,
    explanation_low: &'static str,
    recommendation_high: &'static str,
    recommendation_low: &'static str,
}

const DEFAULT_TEMPLATE: FactorTemplate = FactorTemplate {
    display_name: "Risk Factor",
    explanation_high: "Risk score is elevated.",
    explanation_low: "Risk level is acceptable.",
    recommendation_high: "Investigate and take appropriate action.",
    recommendation_low: "No action needed.",
};

fn template_for(factor_name: &str) -> FactorTemplate {
    match factor_name {
        "payment_risk" => FactorTemplate {
            display_name: "Payment Risk",
            explanation_high: "Customer payment behavior shows elevated late-payment risk.",
            explanation_low: "Customer payment behavior is normal.",
            recommendation_high: "Consider requiring advance payment or reducing credit terms.",
            recommendation_low: "No action needed. Continue monitoring.",
        },
        "route_disruption" => FactorTemplate {
            display_name: "Route Disruption",
            explanation_high: "The route shows an elevated disruption and delay rate.",
            explanation_low: "Route is performing normally.",
            recommendation_high:
                "Consider alternative routes or adding buffer time to delivery estimates.",
            recommendation_low: "No action needed.",
        },
        "order_risk_composite" => FactorTemplate {
            display_name: "Order Composite Risk",
            explanation_high:
                "Order combines multiple risk factors across customer, route, and value exposure.",
            explanation_low: "Order risk factors are within normal parameters.",
            recommendation_high:
                "Review order before approval. Consider splitting shipment or requiring insurance.",
            recommendation_low: "Standard processing recommended.",
        },
        "customer_creditworthiness" => FactorTemplate {
            display_name: "Customer Creditworthiness",
            explanation_high: "Customer credit exposure is elevated for its tier and terms.",
            explanation_low: "Customer is in good standing.",
            recommendation_high: "Review credit limits and consider additional collateral.",
            recommendation_low: "No action needed.",
        },
        "market_volatility" => FactorTemplate {
            display_name: "Market Volatility",
            explanation_high: "Market conditions show elevated volatility in freight rates.",
            explanation_low: "Market conditions are stable.",
            recommendation_high: "Lock in rates where possible. Monitor daily.",
            recommendation_low: "Standard market monitoring.",
        },
        _ => DEFAULT_TEMPLATE,
    }
}

/// Break composite risk scores into explainable factors
#[derive(Debug, Clone, Default)]
pub struct DecompositionEngine;

impl DecompositionEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn decompose(
        &self,
        entity_type: &str,
        entity_id: &str,
        composite_score: f64,
        confidence: f64,
        factor_scores: &HashMap<String, f64>,
        factor_weights: &HashMap<String, f64>,
    ) -> RiskDecomposition {
        let total_weighted: f64 = factor_scores
            .iter()
            .map(|(name, score)| score * factor_weights.get(name).copied().unwrap_or(0.0))
            .sum();

        let mut factors: Vec<RiskFactor> = factor_scores
            .iter()
            .map(|(name, score)| {
                let weight = factor_weights.get(name).copied().unwrap_or(0.1);
                let weighted = score * weight;
                let pct = if total_weighted > 0.0 {
                    weighted / total_weighted * 100.0
                } else {
                    0.0
                };

                let template = template_for(name);
                let is_high = *score >= 50.0;
                let (explanation, recommendation) = if is_high {
                    (
                        format!("{} Score: {score:.0}/100.", template.explanation_high),
                        template.recommendation_high.to_string(),
                    )
                } else {
                    (
                        format!("{} Score: {score:.0}/100.", template.explanation_low),
                        template.recommendation_low.to_string(),
                    )
                };

                RiskFactor {
                    factor_name: name.clone(),
                    display_name: template.display_name.to_string(),
                    score: *score,
                    weight,
                    contribution_pct: pct,
                    explanation,
                    recommendation,
                }
            })
            .collect();

        factors.sort_by(|a, b| {
            b.contribution_pct
                .partial_cmp(&a.contribution_pct)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let primary_driver = factors
            .first()
            .map(|f| f.display_name.clone())
            .unwrap_or_else(|| "Unknown".to_string());

        let summary = if composite_score >= 70.0 {
            format!("HIGH RISK ({composite_score:.0}/100): Primary driver is {primary_driver}.")
        } else if composite_score >= 40.0 {
            format!("MODERATE RISK ({composite_score:.0}/100): Key factor is {primary_driver}.")
        } else {
            format!("LOW RISK ({composite_score:.0}/100): All factors within acceptable range.")
        };

        RiskDecomposition {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            composite_score,
            confidence,
            factors,
            primary_driver,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factors_sorted_by_contribution_with_primary_driver() {
        let scores = HashMap::from([
            ("payment_risk".to_string(), 72.0),
            ("route_disruption".to_string(), 55.0),
            ("order_risk_composite".to_string(), 48.0),
        ]);
        let weights = HashMap::from([
            ("payment_risk".to_string(), 0.30),
            ("route_disruption".to_string(), 0.25),
            ("order_risk_composite".to_string(), 0.20),
        ]);

        let decomp =
            DecompositionEngine::new().decompose("order", "ORD-42", 58.0, 0.75, &scores, &weights);

        assert_eq!(decomp.primary_driver, "Payment Risk");
        for pair in decomp.factors.windows(2) {
            assert!(pair[0].contribution_pct >= pair[1].contribution_pct);
        }
        let total: f64 = decomp.factors.iter().map(|f| f.contribution_pct).sum();
        assert!((total - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_summary_bands() {
        let scores = HashMap::from([("payment_risk".to_string(), 80.0)]);
        let weights = HashMap::from([("payment_risk".to_string(), 0.3)]);
        let engine = DecompositionEngine::new();

        let high = engine.decompose("order", "o", 75.0, 0.8, &scores, &weights);
        assert!(high.summary.starts_with("HIGH RISK"));

        let moderate = engine.decompose("order", "o", 45.0, 0.8, &scores, &weights);
        assert!(moderate.summary.starts_with("MODERATE RISK"));

        let low = engine.decompose("order", "o", 20.0, 0.8, &scores, &weights);
        assert!(low.summary.starts_with("LOW RISK"));
    }

    #[test]
    fn test_high_and_low_branches_pick_different_text() {
        let engine = DecompositionEngine::new();
        let weights = HashMap::from([("payment_risk".to_string(), 0.3)]);

        let high = engine.decompose(
            "order",
            "o",
            60.0,
            0.8,
            &HashMap::from([("payment_risk".to_string(), 80.0)]),
            &weights,
        );
        let low = engine.decompose(
            "order",
            "o",
            20.0,
            0.8,
            &HashMap::from([("payment_risk".to_string(), 20.0)]),
            &weights,
        );
        assert_ne!(high.factors[0].explanation, low.factors[0].explanation);
        assert_ne!(
            high.factors[0].recommendation,
            low.factors[0].recommendation
        );
    }

    #[test]
    fn test_unknown_factor_uses_default_template() {
        let decomp = DecompositionEngine::new().decompose(
            "route",
            "r",
            30.0,
            0.5,
            &HashMap::from([("solar_flare".to_string(), 30.0)]),
            &HashMap::new(),
        );
        assert_eq!(decomp.factors[0].display_name, "Risk Factor");
        assert_eq!(decomp.factors[0].weight, 0.1);
    }
}
