//! Action generation.
//!
//! Turns a risk assessment into concrete candidate actions, each with an
//! estimated cost, benefit, success probability, and execution time. Higher
//! scores unlock more aggressive mitigations.

use crate::engine::RiskAssessment;
use serde::{Deserialize, Serialize};

const REROUTE_BASE_COST_USD: f64 = 5000.0;
const INSURANCE_RATE: f64 = 0.02;
const HEDGE_RATE: f64 = 0.015;
const DELAY_COST_PER_DAY_USD: f64 = 500.0;
const SPLIT_OVERHEAD_PCT: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Reroute,
    Insure,
    DelayShipment,
    HedgeExposure,
    SplitShipment,
    MonitorOnly,
    EscalateToHuman,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Reroute => "reroute",
            ActionType::Insure => "insure",
            ActionType::DelayShipment => "delay_shipment",
            ActionType::HedgeExposure => "hedge_exposure",
            ActionType::SplitShipment => "split_shipment",
            ActionType::MonitorOnly => "monitor_only",
            ActionType::EscalateToHuman => "escalate_to_human",
        }
    }
}

/// A concrete action that can be taken
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action_type: ActionType,
    pub description: String,
    pub estimated_cost_usd: f64,
    pub estimated_benefit_usd: f64,
    /// benefit − cost
    pub net_value: f64,
    /// 0-1
    pub success_probability: f64,
    pub time_to_execute_hours: f64,
    pub requirements: Vec<String>,
    pub risks: Vec<String>,
}

fn action(
    action_type: ActionType,
    description: impl Into<String>,
    cost: f64,
    benefit: f64,
    success: f64,
    hours: f64,
    requirements: &[&str],
    risks: &[&str],
) -> Action {
    Action {
        action_type,
        description: description.into(),
        estimated_cost_usd: cost,
        estimated_benefit_usd: benefit,
        net_value: benefit - cost,
        success_probability: success,
        time_to_execute_hours: hours,
        requirements: requirements.iter().map(|s| s.to_string()).collect(),
        risks: risks.iter().map(|s| s.to_string()).collect(),
    }
}

/// Generates candidate actions from an assessment
#[derive(Debug, Clone, Default)]
pub struct ActionGenerator;

impl ActionGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate_actions(
        &self,
        assessment: &RiskAssessment,
        exposure_usd: f64,
        delivery_days: f64,
    ) -> Vec<Action> {
        let score = assessment.risk_score;
        let mut actions = vec![self.monitor(score)];

        if score >= 25.0 {
            actions.push(self.insure(exposure_usd, score));
        }
        if score >= 40.0 {
            actions.push(self.reroute(exposure_usd, delivery_days, score));
            actions.push(self.hedge(exposure_usd, score));
        }
        if score >= 50.0 {
            actions.push(self.delay(exposure_usd, delivery_days, score));
        }
        if score >= 60.0 {
            actions.push(self.split(exposure_usd, score));
        }
        if score >= 70.0 || !assessment.is_reliable {
            actions.push(self.escalate());
        }

        actions.sort_by(|a, b| {
            b.net_value
                .partial_cmp(&a.net_value)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        actions
    }

    fn monitor(&self, score: f64) -> Action {
        action(
            ActionType::MonitorOnly,
            "Continue monitoring. No immediate action required.",
            0.0,
            0.0,
            1.0 - score / 100.0,
            0.0,
            &["Active monitoring dashboard"],
            &["Risk may escalate if unaddressed"],
        )
    }

    fn insure(&self, exposure: f64, score: f64) -> Action {
        action(
            ActionType::Insure,
            "Purchase cargo insurance to cover potential loss.",
            exposure * INSURANCE_RATE,
            exposure * (score / 100.0) * 0.9,
            0.95,
            4.0,
            &["Insurance provider available", "Policy terms acceptable"],
            &["Claim process may be slow", "Coverage may have exclusions"],
        )
    }

    fn reroute(&self, exposure: f64, days: f64, score: f64) -> Action {
        action(
            ActionType::Reroute,
            "Reroute shipment via alternative route to avoid disruption.",
            REROUTE_BASE_COST_USD + exposure * 0.01,
            exposure * (score / 100.0) * 0.7,
            (0.6 + score / 200.0).min(0.95),
            24.0 + days * 0.5,
            &["Alternative route available", "Carrier capacity"],
            &["New route may have its own risks", "Additional transit time"],
        )
    }

    fn hedge(&self, exposure: f64, score: f64) -> Action {
        action(
            ActionType::HedgeExposure,
            "Hedge financial exposure via forward contracts or options.",
            exposure * HEDGE_RATE,
            exposure * (score / 100.0) * 0.6,
            0.85,
            8.0,
            &["Treasury approval", "Hedging instrument available"],
            &["Basis risk", "Mark-to-market volatility"],
        )
    }

    fn delay(&self, exposure: f64, days: f64, score: f64) -> Action {
        let delay_days = (days * 0.3).round().max(1.0);
        action(
            ActionType::DelayShipment,
            format!("Delay shipment by {delay_days:.0} days to wait for conditions to improve."),
            delay_days * DELAY_COST_PER_DAY_USD,
            exposure * (score / 100.0) * 0.5,
            0.4 + score / 200.0,
            0.0,
            &["Customer agrees to delay", "Storage available"],
            &["Customer dissatisfaction", "Conditions may not improve"],
        )
    }

    fn split(&self, exposure: f64, score: f64) -> Action {
        action(
            ActionType::SplitShipment,
            "Split shipment across multiple routes/carriers to diversify risk.",
            exposure * SPLIT_OVERHEAD_PCT,
            exposure * (score / 100.0) * 0.8,
            0.80,
            48.0,
            &["Multiple carriers available", "Goods are splittable"],
            &["Coordination complexity", "Higher logistics cost"],
        )
    }

    fn escalate(&self) -> Action {
        action(
            ActionType::EscalateToHuman,
            "Escalate to human decision-maker for manual review.",
            0.0,
            0.0,
            0.90,
            2.0,
            &["Available reviewer", "Decision authority"],
            &["Response time delay"],
        )
    }
}
