//! Outcome recording — what actually happened after a decision.
//!
//! Records are write-once: a second record for the same decision id is a
//! conflict and leaves the stored row untouched. Derived accuracy fields are
//! computed here, once, at write time.

use crate::db::Database;
use crate::errors::ApiError;
use crate::models::fmt_ts;
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Predictions within this error are considered accurate.
const ACCURACY_THRESHOLD: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeType {
    LossOccurred,
    LossAvoided,
    DelayOccurred,
    DelayAvoided,
    NoImpact,
    PartialImpact,
}

impl OutcomeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeType::LossOccurred => "loss_occurred",
            OutcomeType::LossAvoided => "loss_avoided",
            OutcomeType::DelayOccurred => "delay_occurred",
            OutcomeType::DelayAvoided => "delay_avoided",
            OutcomeType::NoImpact => "no_impact",
            OutcomeType::PartialImpact => "partial_impact",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "loss_occurred" => Some(OutcomeType::LossOccurred),
            "loss_avoided" => Some(OutcomeType::LossAvoided),
            "delay_occurred" => Some(OutcomeType::DelayOccurred),
            "delay_avoided" => Some(OutcomeType::DelayAvoided),
            "no_impact" => Some(OutcomeType::NoImpact),
            "partial_impact" => Some(OutcomeType::PartialImpact),
            _ => None,
        }
    }

    /// The risk counts as materialized for loss, delay, and partial impact.
    pub fn materialized(&self) -> bool {
        matches!(
            self,
            OutcomeType::LossOccurred | OutcomeType::DelayOccurred | OutcomeType::PartialImpact
        )
    }
}

/// Request to record an outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecordRequest {
    pub decision_id: String,
    pub outcome_type: OutcomeType,
    #[serde(default)]
    pub actual_loss_usd: f64,
    #[serde(default)]
    pub actual_delay_days: f64,
    #[serde(default)]
    pub action_taken: String,
    #[serde(default)]
    pub action_followed_recommendation: bool,
    #[serde(default)]
    pub action_cost_usd: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

/// The predicted values captured when the decision was generated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictedSnapshot {
    pub entity_type: String,
    pub entity_id: String,
    pub risk_score: f64,
    pub confidence: f64,
    pub loss_usd: f64,
    pub action: String,
}

/// An immutable outcome record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub outcome_id: String,
    pub decision_id: String,
    pub tenant_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub predicted_risk_score: f64,
    pub predicted_confidence: f64,
    pub predicted_loss_usd: f64,
    pub predicted_action: String,
    pub outcome_type: OutcomeType,
    pub actual_loss_usd: f64,
    pub actual_delay_days: f64,
    pub action_taken: String,
    pub action_followed_recommendation: bool,
    pub action_cost_usd: f64,
    pub risk_materialized: bool,
    pub prediction_error: f64,
    pub was_accurate: bool,
    pub value_generated_usd: f64,
    pub recorded_at: String,
    pub recorded_by: Option<String>,
    pub notes: Option<String>,
}

/// Repository over `outcomes`
#[derive(Clone)]
pub struct OutcomeStore {
    db: Database,
}

impl OutcomeStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn insert(&self, record: &OutcomeRecord) -> Result<(), rusqlite::Error> {
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO outcomes (
                id, decision_id, tenant_id, entity_type, entity_id,
                predicted_risk_score, predicted_confidence, predicted_loss_usd, predicted_action,
                outcome_type, actual_loss_usd, actual_delay_days, action_taken,
                action_followed_recommendation, action_cost_usd, risk_materialized,
                prediction_error, was_accurate, value_generated_usd,
                recorded_at, recorded_by, notes
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                       ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
            params![
                record.outcome_id,
                record.decision_id,
                record.tenant_id,
                record.entity_type,
                record.entity_id,
                record.predicted_risk_score,
                record.predicted_confidence,
                record.predicted_loss_usd,
                record.predicted_action,
                record.outcome_type.as_str(),
                record.actual_loss_usd,
                record.actual_delay_days,
                record.action_taken,
                record.action_followed_recommendation,
                record.action_cost_usd,
                record.risk_materialized,
                record.prediction_error,
                record.was_accurate,
                record.value_generated_usd,
                record.recorded_at,
                record.recorded_by,
                record.notes,
            ],
        )?;
        Ok(())
    }

    pub fn get_by_decision(
        &self,
        tenant_id: &str,
        decision_id: &str,
    ) -> Result<Option<OutcomeRecord>> {
        let conn = self.db.lock();
        let record = conn
            .query_row(
                &format!("{SELECT_OUTCOME} WHERE tenant_id = ?1 AND decision_id = ?2"),
                params![tenant_id, decision_id],
                map_outcome,
            )
            .optional()?;
        Ok(record)
    }

    pub fn list(&self, tenant_id: &str, limit: usize, offset: usize) -> Result<Vec<OutcomeRecord>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_OUTCOME} WHERE tenant_id = ?1
             ORDER BY recorded_at DESC LIMIT ?2 OFFSET ?3"
        ))?;
        let records = stmt
            .query_map(params![tenant_id, limit as i64, offset as i64], map_outcome)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Outcomes recorded since a threshold, optionally filtered by
    /// entity type.
    pub fn fetch_since(
        &self,
        tenant_id: &str,
        entity_type: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<OutcomeRecord>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_OUTCOME} WHERE tenant_id = ?1 AND recorded_at >= ?2
               AND (?3 IS NULL OR entity_type = ?3)
             ORDER BY recorded_at ASC"
        ))?;
        let records = stmt
            .query_map(params![tenant_id, fmt_ts(since), entity_type], map_outcome)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn entity_types_with_outcomes(&self, tenant_id: &str) -> Result<Vec<String>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT entity_type FROM outcomes WHERE tenant_id = ?1 ORDER BY entity_type",
        )?;
        let types = stmt
            .query_map(params![tenant_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(types)
    }

    pub fn count(&self, tenant_id: &str) -> Result<i64> {
        let conn = self.db.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM outcomes WHERE tenant_id = ?1",
            params![tenant_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

const SELECT_OUTCOME: &str = "SELECT id, decision_id, tenant_id, entity_type, entity_id,
        predicted_risk_score, predicted_confidence, predicted_loss_usd, predicted_action,
        outcome_type, actual_loss_usd, actual_delay_days, action_taken,
        action_followed_recommendation, action_cost_usd, risk_materialized,
        prediction_error, was_accurate, value_generated_usd, recorded_at, recorded_by, notes
 FROM outcomes";

fn map_outcome(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutcomeRecord> {
    let outcome_raw: String = row.get(9)?;
    Ok(OutcomeRecord {
        outcome_id: row.get(0)?,
        decision_id: row.get(1)?,
        tenant_id: row.get(2)?,
        entity_type: row.get(3)?,
        entity_id: row.get(4)?,
        predicted_risk_score: row.get(5)?,
        predicted_confidence: row.get(6)?,
        predicted_loss_usd: row.get(7)?,
        predicted_action: row.get(8)?,
        outcome_type: OutcomeType::parse(&outcome_raw).unwrap_or(OutcomeType::NoImpact),
        actual_loss_usd: row.get(10)?,
        actual_delay_days: row.get(11)?,
        action_taken: row.get(12)?,
        action_followed_recommendation: row.get(13)?,
        action_cost_usd: row.get(14)?,
        risk_materialized: row.get(15)?,
        prediction_error: row.get(16)?,
        was_accurate: row.get(17)?,
        value_generated_usd: row.get(18)?,
        recorded_at: row.get(19)?,
        recorded_by: row.get(20)?,
        notes: row.get(21)?,
    })
}

/// Records outcomes and computes accuracy-derived fields
#[derive(Clone)]
pub struct OutcomeRecorder {
    store: OutcomeStore,
}

impl OutcomeRecorder {
    pub fn new(store: OutcomeStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &OutcomeStore {
        &self.store
    }

    /// Record an outcome. Write-once per decision id: an existing record is
    /// returned as a conflict with the prior record in the body.
    pub fn record(
        &self,
        tenant_id: &str,
        request: &OutcomeRecordRequest,
        predicted: &PredictedSnapshot,
        recorded_by: Option<&str>,
    ) -> Result<OutcomeRecord, ApiError> {
        if let Some(existing) = self
            .store
            .get_by_decision(tenant_id, &request.decision_id)
            .map_err(ApiError::Internal)?
        {
            return Err(ApiError::conflict(
                "outcome already recorded for decision",
                serde_json::json!({
                    "error": "outcome_exists",
                    "outcome": existing,
                }),
            ));
        }

        let risk_materialized = request.outcome_type.materialized();
        let prediction_error = compute_prediction_error(
            predicted.risk_score,
            risk_materialized,
            predicted.loss_usd,
            request.actual_loss_usd,
        );
        let was_accurate = prediction_error <= ACCURACY_THRESHOLD;
        let value_generated = compute_value_generated(
            predicted.loss_usd,
            request.actual_loss_usd,
            request.action_followed_recommendation,
            risk_materialized,
        );

        let record = OutcomeRecord {
            outcome_id: format!("out_{}", &uuid::Uuid::new_v4().simple().to_string()[..16]),
            decision_id: request.decision_id.clone(),
            tenant_id: tenant_id.to_string(),
            entity_type: predicted.entity_type.clone(),
            entity_id: predicted.entity_id.clone(),
            predicted_risk_score: predicted.risk_score,
            predicted_confidence: predicted.confidence,
            predicted_loss_usd: predicted.loss_usd,
            predicted_action: predicted.action.clone(),
            outcome_type: request.outcome_type,
            actual_loss_usd: request.actual_loss_usd,
            actual_delay_days: request.actual_delay_days,
            action_taken: request.action_taken.clone(),
            action_followed_recommendation: request.action_followed_recommendation,
            action_cost_usd: request.action_cost_usd,
            risk_materialized,
            prediction_error,
            was_accurate,
            value_generated_usd: value_generated,
            recorded_at: fmt_ts(Utc::now()),
            recorded_by: recorded_by.map(str::to_string),
            notes: request.notes.clone(),
        };

        self.store.insert(&record).map_err(|err| {
            // A concurrent writer can still win the unique constraint race.
            if let rusqlite::Error::SqliteFailure(code, _) = &err {
                if code.code == rusqlite::ErrorCode::ConstraintViolation {
                    return ApiError::conflict(
                        "outcome already recorded for decision",
                        serde_json::json!({ "error": "outcome_exists" }),
                    );
                }
            }
            ApiError::Internal(err.into())
        })?;

        info!(
            outcome_id = %record.outcome_id,
            decision_id = %record.decision_id,
            outcome_type = record.outcome_type.as_str(),
            risk_materialized,
            prediction_error,
            value_generated,
            "outcome recorded"
        );

        Ok(record)
    }
}

/// 0.6 × direction error + 0.4 × normalized magnitude error.
fn compute_prediction_error(
    predicted_risk_score: f64,
    risk_materialized: bool,
    predicted_loss_usd: f64,
    actual_loss_usd: f64,
) -> f64 {
    let predicted_binary: f64 = if predicted_risk_score >= 50.0 { 1.0 } else { 0.0 };
    let actual_binary: f64 = if risk_materialized { 1.0 } else { 0.0 };
    let direction_error = (predicted_binary - actual_binary).abs();

    let max_loss = predicted_loss_usd.max(actual_loss_usd).max(1.0);
    let magnitude_error = (predicted_loss_usd - actual_loss_usd).abs() / max_loss;

    0.6 * direction_error + 0.4 * magnitude_error
}

fn compute_value_generated(
    predicted_loss_usd: f64,
    actual_loss_usd: f64,
    action_followed: bool,
    risk_materialized: bool,
) -> f64 {
    match (action_followed, risk_materialized) {
        // Action taken but risk still materialized: value is the reduced loss.
        (true, true) => (predicted_loss_usd - actual_loss_usd).max(0.0),
        // Action taken and risk averted: full predicted loss avoided.
        (true, false) => predicted_loss_usd,
        // Ignored the recommendation and paid for it.
        (false, true) => -actual_loss_usd,
        (false, false) => 0.0,
    }
}
