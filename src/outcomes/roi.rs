//! Return-on-investment reporting over recorded outcomes.

use crate::models::fmt_ts;
use crate::outcomes::recorder::OutcomeStore;
use anyhow::Result;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

/// ROI of decisions over a period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoiReport {
    pub period: String,
    pub generated_at: String,
    pub total_decisions: usize,
    pub decisions_with_outcomes: usize,

    pub total_predicted_loss_usd: f64,
    pub total_actual_loss_usd: f64,
    pub total_loss_avoided_usd: f64,
    pub total_action_cost_usd: f64,
    /// Σ value_generated across outcomes.
    pub net_value_generated_usd: f64,
    /// net value / action cost.
    pub roi_ratio: f64,

    pub recommendation_follow_rate: f64,
    pub actions_that_helped: usize,
    pub actions_that_didnt_help: usize,

    pub recommendation: String,
}

#[derive(Clone)]
pub struct RoiCalculator {
    store: OutcomeStore,
}

impl RoiCalculator {
    pub fn new(store: OutcomeStore) -> Self {
        Self { store }
    }

    pub fn generate_report(&self, tenant_id: &str, days_back: i64) -> Result<RoiReport> {
        let now = Utc::now();
        let since = now - Duration::days(days_back);
        let outcomes = self.store.fetch_since(tenant_id, None, since)?;
        let n = outcomes.len();

        if n == 0 {
            return Ok(RoiReport {
                period: format!("last_{days_back}_days"),
                generated_at: fmt_ts(now),
                total_decisions: 0,
                decisions_with_outcomes: 0,
                total_predicted_loss_usd: 0.0,
                total_actual_loss_usd: 0.0,
                total_loss_avoided_usd: 0.0,
                total_action_cost_usd: 0.0,
                net_value_generated_usd: 0.0,
                roi_ratio: 0.0,
                recommendation_follow_rate: 0.0,
                actions_that_helped: 0,
                actions_that_didnt_help: 0,
                recommendation: "No outcomes recorded in the period. Record outcomes to \
                                 measure value generated."
                    .to_string(),
            });
        }

        let total_predicted: f64 = outcomes.iter().map(|o| o.predicted_loss_usd).sum();
        let total_actual: f64 = outcomes.iter().map(|o| o.actual_loss_usd).sum();
        let total_action_cost: f64 = outcomes.iter().map(|o| o.action_cost_usd).sum();
        let net_value: f64 = outcomes.iter().map(|o| o.value_generated_usd).sum();
        let loss_avoided: f64 = outcomes
            .iter()
            .filter(|o| o.action_followed_recommendation)
            .map(|o| o.value_generated_usd.max(0.0))
            .sum();

        let followed = outcomes
            .iter()
            .filter(|o| o.action_followed_recommendation)
            .count();
        let follow_rate = followed as f64 / n as f64;

        let helped = outcomes
            .iter()
            .filter(|o| o.action_followed_recommendation && o.value_generated_usd > 0.0)
            .count();
        let didnt_help = followed - helped;

        let roi_ratio = net_value / total_action_cost.max(1.0);

        let recommendation = if net_value > 0.0 && roi_ratio >= 2.0 {
            format!(
                "Decisions generated ${net_value:.0} net value at {roi_ratio:.1}x ROI. \
                 Keep following recommendations."
            )
        } else if net_value > 0.0 {
            format!(
                "Decisions are net positive (${net_value:.0}) but ROI is modest \
                 ({roi_ratio:.1}x). Review action costs."
            )
        } else if follow_rate < 0.5 {
            format!(
                "Net value is ${net_value:.0} with only {:.0}% of recommendations \
                 followed. Unfollowed recommendations are leaving value on the table.",
                follow_rate * 100.0
            )
        } else {
            format!(
                "Net value is ${net_value:.0}. Review prediction accuracy before \
                 continuing to act on recommendations."
            )
        };

        Ok(RoiReport {
            period: format!("last_{days_back}_days"),
            generated_at: fmt_ts(now),
            total_decisions: n,
            decisions_with_outcomes: n,
            total_predicted_loss_usd: total_predicted,
            total_actual_loss_usd: total_actual,
            total_loss_avoided_usd: loss_avoided,
            total_action_cost_usd: total_action_cost,
            net_value_generated_usd: net_value,
            roi_ratio,
            recommendation_follow_rate: follow_rate,
            actions_that_helped: helped,
            actions_that_didnt_help: didnt_help,
            recommendation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::outcomes::recorder::{
        OutcomeRecordRequest, OutcomeRecorder, OutcomeType, PredictedSnapshot,
    };

    fn record(
        recorder: &OutcomeRecorder,
        decision_id: &str,
        predicted_loss: f64,
        outcome_type: OutcomeType,
        actual_loss: f64,
        followed: bool,
        action_cost: f64,
    ) {
        recorder
            .record(
                "t",
                &OutcomeRecordRequest {
                    decision_id: decision_id.to_string(),
                    outcome_type,
                    actual_loss_usd: actual_loss,
                    actual_delay_days: 0.0,
                    action_taken: "insure".to_string(),
                    action_followed_recommendation: followed,
                    action_cost_usd: action_cost,
                    notes: None,
                },
                &PredictedSnapshot {
                    entity_type: "order".to_string(),
                    entity_id: "ORD-1".to_string(),
                    risk_score: 70.0,
                    confidence: 0.8,
                    loss_usd: predicted_loss,
                    action: "insure".to_string(),
                },
                None,
            )
            .unwrap();
    }

    #[test]
    fn test_empty_period() {
        let db = Database::open_in_memory().unwrap();
        let report = RoiCalculator::new(OutcomeStore::new(db))
            .generate_report("t", 30)
            .unwrap();
        assert_eq!(report.decisions_with_outcomes, 0);
        assert_eq!(report.roi_ratio, 0.0);
    }

    #[test]
    fn test_net_value_and_follow_rate() {
        let db = Database::open_in_memory().unwrap();
        let store = OutcomeStore::new(db.clone());
        let recorder = OutcomeRecorder::new(store.clone());

        // Followed, risk averted: +50k value, 1k cost.
        record(&recorder, "d1", 50_000.0, OutcomeType::LossAvoided, 0.0, true, 1_000.0);
        // Not followed, risk hit: -20k value.
        record(&recorder, "d2", 30_000.0, OutcomeType::LossOccurred, 20_000.0, false, 0.0);

        let report = RoiCalculator::new(store).generate_report("t", 30).unwrap();
        assert_eq!(report.net_value_generated_usd, 30_000.0);
        assert_eq!(report.total_loss_avoided_usd, 50_000.0);
        assert_eq!(report.total_action_cost_usd, 1_000.0);
        assert_eq!(report.recommendation_follow_rate, 0.5);
        assert_eq!(report.actions_that_helped, 1);
        assert_eq!(report.actions_that_didnt_help, 0);
        assert!(report.roi_ratio > 2.0);
    }
}
