//! Cost/benefit tradeoff ranking.
//!
//! Each action is scored by risk-adjusted net value minus a time penalty;
//! the top action is recommended unless everything is net-negative and
//! inaction is cheap, in which case monitoring wins.

use crate::decisions::actions::{Action, ActionType};
use serde::{Deserialize, Serialize};

/// Outcome of comparing all candidate actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeoffAnalysis {
    pub recommended_action: ActionType,
    pub recommendation_reason: String,
    pub do_nothing_cost: f64,
    pub best_net_value: f64,
    /// Separation between the top two scores, normalized.
    pub confidence: f64,
}

#[derive(Debug, Clone, Default)]
pub struct TradeoffAnalyzer;

impl TradeoffAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, actions: &[Action], inaction_cost: f64) -> TradeoffAnalysis {
        if actions.is_empty() {
            return TradeoffAnalysis {
                recommended_action: ActionType::MonitorOnly,
                recommendation_reason: "No actions available.".to_string(),
                do_nothing_cost: inaction_cost,
                best_net_value: 0.0,
                confidence: 0.0,
            };
        }

        let mut scored: Vec<(f64, &Action)> = actions
            .iter()
            .map(|a| {
                let risk_adjusted = a.net_value * a.success_probability;
                let time_penalty = (0.1 * a.time_to_execute_hours).min(20.0);
                (risk_adjusted - time_penalty, a)
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let (best_score, best_action) = scored[0];

        let (recommended, reason) = if best_action.net_value <= 0.0 && inaction_cost < 1000.0 {
            (
                ActionType::MonitorOnly,
                format!(
                    "All actions have negative net value. \
                     Monitoring is recommended (inaction cost: ${inaction_cost:.0})."
                ),
            )
        } else {
            (
                best_action.action_type,
                format!(
                    "{} is recommended with net value ${:.0} ({:.0}% success probability).",
                    best_action.action_type.as_str(),
                    best_action.net_value,
                    best_action.success_probability * 100.0
                ),
            )
        };

        let confidence = if scored.len() > 1 {
            let gap = (best_score - scored[1].0).abs();
            (gap / best_score.abs().max(1.0)).min(1.0)
        } else {
            0.5
        };

        TradeoffAnalysis {
            recommended_action: recommended,
            recommendation_reason: reason,
            do_nothing_cost: inaction_cost,
            best_net_value: best_action.net_value,
            confidence,
        }
    }
}
