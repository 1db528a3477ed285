//! Stage B — correlation discounting.
//!
//! Two signal types that frequently co-occur on the same entities likely
//! reflect the same underlying issue; naively summing them overestimates
//! risk. Co-occurrence is measured as Jaccard similarity over entity sets;
//! for each correlated pair the weaker signal is discounted.

use crate::config::Config;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A signal observation for correlation analysis
#[derive(Debug, Clone)]
pub struct SignalObservation {
    pub signal_type: String,
    pub entity_id: String,
    pub severity_score: f64,
}

/// A pair of correlated signal types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationPair {
    pub signal_a: String,
    pub signal_b: String,
    pub correlation: f64,
    pub n_co_occurrences: usize,
    pub discount_applied: f64,
}

/// Full correlation analysis of a signal set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationReport {
    pub n_signals: usize,
    pub n_correlated_pairs: usize,
    pub pairs: Vec<CorrelationPair>,
    pub total_discount: f64,
}

/// Detects and discounts correlated signals
#[derive(Debug, Clone)]
pub struct CorrelationEngine {
    threshold: f64,
    discount: f64,
}

impl CorrelationEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            threshold: config.correlation_threshold,
            discount: config.correlation_discount,
        }
    }

    pub fn analyze(&self, signals: &[SignalObservation]) -> CorrelationReport {
        if signals.len() < 2 {
            return CorrelationReport {
                n_signals: signals.len(),
                n_correlated_pairs: 0,
                pairs: vec![],
                total_discount: 0.0,
            };
        }

        // Entity sets per signal type; BTree keeps pair iteration stable.
        let mut type_entities: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for s in signals {
            type_entities
                .entry(&s.signal_type)
                .or_default()
                .insert(&s.entity_id);
        }

        let types: Vec<&str> = type_entities.keys().copied().collect();
        let mut pairs: Vec<CorrelationPair> = Vec::new();

        for (i, type_a) in types.iter().enumerate() {
            for type_b in &types[i + 1..] {
                let entities_a = &type_entities[type_a];
                let entities_b = &type_entities[type_b];

                let n_co = entities_a.intersection(entities_b).count();
                if n_co == 0 {
                    continue;
                }
                let union = entities_a.union(entities_b).count();
                let correlation = n_co as f64 / union.max(1) as f64;

                if correlation >= self.threshold {
                    pairs.push(CorrelationPair {
                        signal_a: type_a.to_string(),
                        signal_b: type_b.to_string(),
                        correlation,
                        n_co_occurrences: n_co,
                        discount_applied: self.discount * correlation,
                    });
                }
            }
        }

        let total_discount = pairs.iter().map(|p| p.discount_applied).sum();

        CorrelationReport {
            n_signals: signals.len(),
            n_correlated_pairs: pairs.len(),
            pairs,
            total_discount,
        }
    }

    /// Apply the discount: for each correlated pair, the lower-severity
    /// signal's score is multiplied by `(1 - discount_applied)`.
    pub fn apply_discount(
        &self,
        scores: &HashMap<String, f64>,
        report: &CorrelationReport,
    ) -> HashMap<String, f64> {
        let mut adjusted = scores.clone();
        for pair in &report.pairs {
            let score_a = adjusted.get(&pair.signal_a).copied().unwrap_or(0.0);
            let score_b = adjusted.get(&pair.signal_b).copied().unwrap_or(0.0);
            if score_a <= score_b {
                adjusted.insert(pair.signal_a.clone(), score_a * (1.0 - pair.discount_applied));
            } else {
                adjusted.insert(pair.signal_b.clone(), score_b * (1.0 - pair.discount_applied));
            }
        }
        adjusted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> CorrelationEngine {
        CorrelationEngine::new(&Config::default())
    }

    fn obs(signal_type: &str, entity_id: &str, score: f64) -> SignalObservation {
        SignalObservation {
            signal_type: signal_type.to_string(),
            entity_id: entity_id.to_string(),
            severity_score: score,
        }
    }

    #[test]
    fn test_perfect_overlap_is_fully_correlated() {
        let signals = vec![
            obs("payment_risk", "ORD-1", 70.0),
            obs("order_risk_composite", "ORD-1", 50.0),
        ];
        let report = engine().analyze(&signals);
        assert_eq!(report.n_correlated_pairs, 1);
        assert!((report.pairs[0].correlation - 1.0).abs() < 1e-9);
        assert!((report.pairs[0].discount_applied - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_disjoint_entities_not_correlated() {
        let signals = vec![
            obs("payment_risk", "ORD-1", 70.0),
            obs("route_disruption", "ORD-2", 60.0),
        ];
        let report = engine().analyze(&signals);
        assert_eq!(report.n_correlated_pairs, 0);
    }

    #[test]
    fn test_weaker_signal_gets_discounted() {
        let eng = engine();
        let signals = vec![
            obs("payment_risk", "ORD-1", 70.0),
            obs("order_risk_composite", "ORD-1", 50.0),
        ];
        let report = eng.analyze(&signals);
        let scores = HashMap::from([
            ("payment_risk".to_string(), 70.0),
            ("order_risk_composite".to_string(), 50.0),
        ]);
        let adjusted = eng.apply_discount(&scores, &report);

        // corr = 1.0 → discount 0.5 → weaker score halves.
        assert_eq!(adjusted["payment_risk"], 70.0);
        assert!((adjusted["order_risk_composite"] - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_below_threshold_overlap_ignored() {
        // Overlap 1 of 3 entities → Jaccard 1/3 < 0.5.
        let signals = vec![
            obs("payment_risk", "ORD-1", 70.0),
            obs("payment_risk", "ORD-2", 60.0),
            obs("route_disruption", "ORD-1", 55.0),
            obs("route_disruption", "ORD-3", 45.0),
        ];
        let report = engine().analyze(&signals);
        assert_eq!(report.n_correlated_pairs, 0);
    }

    #[test]
    fn test_single_signal_short_circuits() {
        let report = engine().analyze(&[obs("payment_risk", "ORD-1", 70.0)]);
        assert_eq!(report.n_signals, 1);
        assert_eq!(report.n_correlated_pairs, 0);
    }
}
