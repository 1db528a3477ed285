//! Decision engine.
//!
//! Assessment → exposure estimate → candidate actions → tradeoff ranking →
//! escalation rules → counterfactuals, packaged into an auditable decision
//! object with a validity window.

pub mod actions;
pub mod counterfactual;
pub mod escalation;
pub mod tradeoffs;

pub use actions::{Action, ActionGenerator, ActionType};
pub use counterfactual::{CounterfactualEngine, CounterfactualScenario};
pub use escalation::{EscalationEngine, EscalationRule};
pub use tradeoffs::{TradeoffAnalysis, TradeoffAnalyzer};

use crate::alerts::{Alert, AlertDispatcher, AlertSource};
use crate::audit::{AuditEvent, AuditLog};
use crate::config::Config;
use crate::db::{InternalSignalStore, OrderStore};
use crate::engine::RiskEngine;
use crate::errors::ApiError;
use crate::models::{fmt_ts, Freshness, SeverityLevel};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_DELIVERY_DAYS: f64 = 14.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStatus {
    Recommended,
    Escalated,
}

/// A complete, auditable decision — a value object, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub decision_id: String,
    pub tenant_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub status: DecisionStatus,
    pub severity: SeverityLevel,

    // What is happening?
    pub situation_summary: String,
    pub risk_score: f64,
    pub confidence: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,

    // What should we do?
    pub recommended_action: Action,
    pub alternative_actions: Vec<Action>,
    pub tradeoff: TradeoffAnalysis,

    // What if we do nothing?
    pub inaction_cost: f64,
    pub inaction_risk: String,
    pub counterfactuals: Vec<CounterfactualScenario>,

    // Human-in-the-loop
    pub needs_human_review: bool,
    pub escalation_rules: Vec<EscalationRule>,
    pub escalation_reason: Option<String>,

    // Audit
    pub algorithm_trace: serde_json::Value,
    pub data_sources: Vec<String>,
    pub generated_at: String,
    pub valid_until: String,

    pub exposure_usd: f64,
    pub n_signals_used: usize,
    pub is_reliable: bool,
    pub data_freshness: Freshness,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionList {
    pub decisions: Vec<Decision>,
    pub total: usize,
}

/// Orchestrates decision generation on top of the risk engine
#[derive(Clone)]
pub struct DecisionEngine {
    config: Arc<Config>,
    risk_engine: RiskEngine,
    signals: InternalSignalStore,
    orders: OrderStore,
    audit: AuditLog,
    alerts: Option<AlertDispatcher>,
    action_generator: ActionGenerator,
    tradeoff_analyzer: TradeoffAnalyzer,
    escalation_engine: EscalationEngine,
    counterfactual_engine: CounterfactualEngine,
}

impl DecisionEngine {
    pub fn new(
        config: Arc<Config>,
        risk_engine: RiskEngine,
        signals: InternalSignalStore,
        orders: OrderStore,
        audit: AuditLog,
        alerts: Option<AlertDispatcher>,
    ) -> Self {
        Self {
            escalation_engine: EscalationEngine::new(&config),
            config,
            risk_engine,
            signals,
            orders,
            audit,
            alerts,
            action_generator: ActionGenerator::new(),
            tradeoff_analyzer: TradeoffAnalyzer::new(),
            counterfactual_engine: CounterfactualEngine::new(),
        }
    }

    pub fn generate_decision(
        &self,
        tenant_id: &str,
        entity_type: &str,
        entity_id: &str,
        exposure_usd: Option<f64>,
    ) -> Result<Decision, ApiError> {
        let now = Utc::now();
        let decision_id = format!("dec_{}", &uuid::Uuid::new_v4().simple().to_string()[..16]);

        let assessment = self
            .risk_engine
            .assess_entity(tenant_id, entity_type, entity_id)
            .map_err(ApiError::Internal)?;

        let (exposure, delivery_days) = match exposure_usd {
            Some(value) => (value, self.delivery_days(tenant_id, entity_type, entity_id)),
            None => self.estimate_exposure(tenant_id, entity_type, entity_id)?,
        };

        let actions = self
            .action_generator
            .generate_actions(&assessment, exposure, delivery_days);

        let inaction_cost = exposure * assessment.risk_score / 100.0;
        let tradeoff = self.tradeoff_analyzer.analyze(&actions, inaction_cost);

        let escalation = self.escalation_engine.evaluate(&assessment, exposure);
        let counterfactuals = self
            .counterfactual_engine
            .generate_scenarios(&assessment, exposure);

        let recommended = actions
            .iter()
            .find(|a| a.action_type == tradeoff.recommended_action)
            .cloned()
            .unwrap_or_else(|| actions[0].clone());
        let alternatives: Vec<Action> = actions
            .iter()
            .filter(|a| a.action_type != recommended.action_type)
            .cloned()
            .collect();

        let status = if escalation.needs_escalation {
            DecisionStatus::Escalated
        } else {
            DecisionStatus::Recommended
        };

        let decision = Decision {
            decision_id: decision_id.clone(),
            tenant_id: tenant_id.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            status,
            severity: assessment.severity_label,
            situation_summary: assessment.summary.clone(),
            risk_score: assessment.risk_score,
            confidence: assessment.confidence,
            ci_lower: assessment.ci_lower,
            ci_upper: assessment.ci_upper,
            recommended_action: recommended.clone(),
            alternative_actions: alternatives,
            tradeoff,
            inaction_cost,
            inaction_risk: format!(
                "If no action is taken, estimated loss is ${inaction_cost:.0} \
                 with {:.0}% probability.",
                assessment.risk_score
            ),
            counterfactuals,
            needs_human_review: escalation.needs_escalation,
            escalation_rules: escalation.rules,
            escalation_reason: escalation
                .needs_escalation
                .then(|| escalation.reason_summary.clone()),
            algorithm_trace: assessment.algorithm_trace.clone(),
            data_sources: vec![
                format!("signals:{}", assessment.n_signals),
                format!("active:{}", assessment.n_active_signals),
                format!("freshness:{}", assessment.data_freshness.as_str()),
            ],
            generated_at: fmt_ts(now),
            valid_until: fmt_ts(now + Duration::hours(self.config.decision_valid_hours)),
            exposure_usd: exposure,
            n_signals_used: assessment.n_signals,
            is_reliable: assessment.is_reliable,
            data_freshness: assessment.data_freshness,
        };

        info!(
            decision_id = %decision_id,
            entity = %format!("{entity_type}/{entity_id}"),
            risk_score = assessment.risk_score,
            recommended = recommended.action_type.as_str(),
            escalated = decision.needs_human_review,
            "decision generated"
        );

        self.audit.record_best_effort(
            AuditEvent::new("decision_generated")
                .tenant(tenant_id)
                .resource("decision", decision_id.clone()),
        );

        if self.config.alert_on_decision && decision.needs_human_review {
            if let Some(alerts) = &self.alerts {
                alerts.dispatch(Alert {
                    tenant_id: tenant_id.to_string(),
                    source: AlertSource::Decision,
                    subject: format!("Decision escalated for {entity_type}/{entity_id}"),
                    severity_score: assessment.risk_score,
                    resource_id: decision_id,
                    details: serde_json::json!({
                        "reason": decision.escalation_reason,
                        "recommended_action": recommended.action_type.as_str(),
                    }),
                    raised_at: now,
                });
            }
        }

        Ok(decision)
    }

    /// Generate decisions for every at-risk entity, ordered by max
    /// severity. Individual failures are logged and skipped.
    pub fn generate_for_company(
        &self,
        tenant_id: &str,
        entity_type: &str,
        min_severity: f64,
        limit: usize,
    ) -> Result<DecisionList, ApiError> {
        let entity_ids = self
            .signals
            .entities_above_severity(tenant_id, entity_type, min_severity, limit)
            .map_err(ApiError::Internal)?;

        let mut decisions = Vec::with_capacity(entity_ids.len());
        for entity_id in entity_ids {
            match self.generate_decision(tenant_id, entity_type, &entity_id, None) {
                Ok(decision) => decisions.push(decision),
                Err(err) => {
                    error!(
                        entity_id = %entity_id,
                        error = %err,
                        "decision generation failed, skipping entity"
                    );
                }
            }
        }

        Ok(DecisionList {
            total: decisions.len(),
            decisions,
        })
    }

    /// Orders use their stored total value; other entities are estimated
    /// from average signal severity scaled by the configured factor.
    fn estimate_exposure(
        &self,
        tenant_id: &str,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<(f64, f64), ApiError> {
        if entity_type == "order" {
            if let Some((total_value, delivery_days)) = self
                .orders
                .order_value(tenant_id, entity_id)
                .map_err(ApiError::Internal)?
            {
                return Ok((total_value, delivery_days));
            }
        }

        let avg = self
            .signals
            .avg_severity(tenant_id, entity_type, entity_id)
            .map_err(ApiError::Internal)?
            .unwrap_or(0.0);
        Ok((avg * self.config.exposure_scale_usd, DEFAULT_DELIVERY_DAYS))
    }

    fn delivery_days(&self, tenant_id: &str, entity_type: &str, entity_id: &str) -> f64 {
        if entity_type == "order" {
            if let Ok(Some((_, days))) = self.orders.order_value(tenant_id, entity_id) {
                return days;
            }
        }
        DEFAULT_DELIVERY_DAYS
    }
}
