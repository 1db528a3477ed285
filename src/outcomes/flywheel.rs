//! The learning flywheel — outcomes feed back into priors.
//!
//! For each (tenant, entity_type) with enough recent outcomes, the observed
//! materialization rate shifts the Beta prior, conservatively: the shift is
//! scaled by a learning rate and capped, so one bad week cannot destabilize
//! the engine. Stored priors are the active configuration the risk engine
//! reads on its next assessment.

use crate::config::Config;
use crate::db::Database;
use crate::models::{fmt_ts, parse_ts};
use crate::outcomes::recorder::OutcomeStore;
use anyhow::Result;
use chrono::{Duration, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Repository over `flywheel_priors` — the active Bayesian priors.
#[derive(Clone)]
pub struct PriorStore {
    db: Database,
}

impl PriorStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn store(&self, tenant_id: &str, entity_type: &str, alpha: f64, beta: f64) -> Result<()> {
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO flywheel_priors (tenant_id, entity_type, alpha, beta, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(tenant_id, entity_type)
             DO UPDATE SET alpha = excluded.alpha, beta = excluded.beta,
                           updated_at = excluded.updated_at",
            params![tenant_id, entity_type, alpha, beta, fmt_ts(Utc::now())],
        )?;
        Ok(())
    }

    /// The active (α, β) for a tenant/entity-type, if the flywheel has
    /// written one.
    pub fn active_priors(&self, tenant_id: &str, entity_type: &str) -> Result<Option<(f64, f64)>> {
        let conn = self.db.lock();
        let priors = conn
            .query_row(
                "SELECT alpha, beta FROM flywheel_priors
                 WHERE tenant_id = ?1 AND entity_type = ?2",
                params![tenant_id, entity_type],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(priors)
    }
}

/// Flywheel diagnostics for one (tenant, entity_type)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlywheelState {
    pub entity_key: String,
    pub entity_type: String,
    pub n_outcomes: usize,
    pub n_materialized: usize,
    pub n_not_materialized: usize,
    pub avg_prediction_error: f64,
    pub calibration_drift: f64,
    pub updated_alpha: f64,
    pub updated_beta: f64,
    pub prior_alpha: f64,
    pub prior_beta: f64,
    pub needs_recalibration: bool,
    pub last_updated: String,
}

/// Summary of the flywheel's learning progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningSummary {
    pub total_outcomes: i64,
    pub recent_outcomes: usize,
    pub previous_period_outcomes: usize,
    pub recent_avg_error: f64,
    pub previous_avg_error: f64,
    pub improvement_rate: f64,
    pub improving: bool,
    pub entity_states: Vec<FlywheelState>,
    pub entities_needing_recalibration: usize,
    pub flywheel_status: String,
}

/// Computes and applies Bayesian prior updates from outcome history
#[derive(Clone)]
pub struct FlywheelEngine {
    outcomes: OutcomeStore,
    priors: PriorStore,
    learning_rate: f64,
    max_shift: f64,
    drift_threshold: f64,
    min_outcomes: usize,
    default_alpha: f64,
    default_beta: f64,
}

impl FlywheelEngine {
    pub fn new(outcomes: OutcomeStore, priors: PriorStore, config: &Config) -> Self {
        Self {
            outcomes,
            priors,
            learning_rate: config.flywheel_learning_rate,
            max_shift: config.flywheel_max_shift,
            drift_threshold: config.flywheel_drift_threshold,
            min_outcomes: config.flywheel_min_outcomes,
            default_alpha: config.prior_alpha,
            default_beta: config.prior_beta,
        }
    }

    /// Compute updated priors for one entity type from its outcome history.
    /// Advisory: nothing is stored until [`apply`](Self::apply) is called.
    pub fn compute_updated_priors(
        &self,
        tenant_id: &str,
        entity_type: &str,
        days_back: i64,
    ) -> Result<FlywheelState> {
        let now = Utc::now();
        let entity_key = format!("{tenant_id}/{entity_type}");
        let since = now - Duration::days(days_back);
        let outcomes = self
            .outcomes
            .fetch_since(tenant_id, Some(entity_type), since)?;
        let n = outcomes.len();

        if n < self.min_outcomes {
            return Ok(FlywheelState {
                entity_key,
                entity_type: entity_type.to_string(),
                n_outcomes: n,
                n_materialized: 0,
                n_not_materialized: 0,
                avg_prediction_error: 0.0,
                calibration_drift: 0.0,
                updated_alpha: self.default_alpha,
                updated_beta: self.default_beta,
                prior_alpha: self.default_alpha,
                prior_beta: self.default_beta,
                needs_recalibration: false,
                last_updated: fmt_ts(now),
            });
        }

        let n_materialized = outcomes.iter().filter(|o| o.risk_materialized).count();
        let observed_rate = n_materialized as f64 / n as f64;
        let prior_rate = self.default_alpha / (self.default_alpha + self.default_beta);

        let shift = ((observed_rate - prior_rate) * self.learning_rate * n as f64)
            .clamp(-self.max_shift, self.max_shift);
        let updated_alpha = (self.default_alpha + shift).max(0.5);
        let updated_beta = (self.default_beta - shift * 0.5).max(0.5);

        let avg_predicted_rate = outcomes
            .iter()
            .map(|o| o.predicted_risk_score / 100.0)
            .sum::<f64>()
            / n as f64;
        let calibration_drift = (avg_predicted_rate - observed_rate).abs();
        let avg_prediction_error =
            outcomes.iter().map(|o| o.prediction_error).sum::<f64>() / n as f64;

        let state = FlywheelState {
            entity_key: entity_key.clone(),
            entity_type: entity_type.to_string(),
            n_outcomes: n,
            n_materialized,
            n_not_materialized: n - n_materialized,
            avg_prediction_error,
            calibration_drift,
            updated_alpha,
            updated_beta,
            prior_alpha: self.default_alpha,
            prior_beta: self.default_beta,
            needs_recalibration: calibration_drift > self.drift_threshold,
            last_updated: fmt_ts(now),
        };

        info!(
            entity_key = %entity_key,
            n_outcomes = n,
            observed_rate,
            prior_rate,
            drift = calibration_drift,
            needs_recalibration = state.needs_recalibration,
            updated_alpha,
            updated_beta,
            "flywheel priors computed"
        );

        Ok(state)
    }

    /// Persist a computed state's priors, making them the active
    /// configuration for the engine's next assessment.
    pub fn apply(&self, tenant_id: &str, state: &FlywheelState) -> Result<()> {
        self.priors.store(
            tenant_id,
            &state.entity_type,
            state.updated_alpha,
            state.updated_beta,
        )
    }

    /// Compute states for every entity type with outcomes.
    pub fn compute_all_priors(&self, tenant_id: &str, days_back: i64) -> Result<Vec<FlywheelState>> {
        let entity_types = self.outcomes.entity_types_with_outcomes(tenant_id)?;
        entity_types
            .iter()
            .map(|et| self.compute_updated_priors(tenant_id, et, days_back))
            .collect()
    }

    /// Learning progress: error trend over the last two 7-day windows plus
    /// per-entity-type states.
    pub fn learning_summary(&self, tenant_id: &str) -> Result<LearningSummary> {
        let now = Utc::now();
        let total_outcomes = self.outcomes.count(tenant_id)?;

        let recent_cutoff = now - Duration::days(7);
        let older_cutoff = now - Duration::days(14);

        let recent: Vec<f64> = self
            .outcomes
            .fetch_since(tenant_id, None, recent_cutoff)?
            .iter()
            .map(|o| o.prediction_error)
            .collect();
        let older: Vec<f64> = self
            .outcomes
            .fetch_since(tenant_id, None, older_cutoff)?
            .iter()
            .filter(|o| {
                parse_ts(&o.recorded_at)
                    .map(|t| t < recent_cutoff)
                    .unwrap_or(false)
            })
            .map(|o| o.prediction_error)
            .collect();

        let recent_avg = mean(&recent);
        let older_avg = mean(&older);
        let improvement = if older_avg > 0.0 && recent_avg > 0.0 {
            (older_avg - recent_avg) / older_avg
        } else {
            0.0
        };

        let states = self.compute_all_priors(tenant_id, 90)?;
        let needing = states.iter().filter(|s| s.needs_recalibration).count();

        Ok(LearningSummary {
            total_outcomes,
            recent_outcomes: recent.len(),
            previous_period_outcomes: older.len(),
            recent_avg_error: recent_avg,
            previous_avg_error: older_avg,
            improvement_rate: improvement,
            improving: improvement > 0.0,
            entity_states: states,
            entities_needing_recalibration: needing,
            flywheel_status: if total_outcomes >= self.min_outcomes as i64 {
                "learning".to_string()
            } else {
                "collecting_data".to_string()
            },
        })
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcomes::recorder::{
        OutcomeRecordRequest, OutcomeRecorder, OutcomeType, PredictedSnapshot,
    };

    fn fixture(db: &Database) -> (FlywheelEngine, OutcomeRecorder, PriorStore) {
        let store = OutcomeStore::new(db.clone());
        let priors = PriorStore::new(db.clone());
        let engine = FlywheelEngine::new(store.clone(), priors.clone(), &Config::default());
        (engine, OutcomeRecorder::new(store), priors)
    }

    fn record(recorder: &OutcomeRecorder, decision_id: &str, score: f64, outcome: OutcomeType) {
        recorder
            .record(
                "t",
                &OutcomeRecordRequest {
                    decision_id: decision_id.to_string(),
                    outcome_type: outcome,
                    actual_loss_usd: 0.0,
                    actual_delay_days: 0.0,
                    action_taken: String::new(),
                    action_followed_recommendation: false,
                    action_cost_usd: 0.0,
                    notes: None,
                },
                &PredictedSnapshot {
                    entity_type: "order".to_string(),
                    entity_id: "ORD-1".to_string(),
                    risk_score: score,
                    confidence: 0.8,
                    loss_usd: 0.0,
                    action: "monitor_only".to_string(),
                },
                None,
            )
            .unwrap();
    }

    #[test]
    fn test_too_few_outcomes_keeps_default_priors() {
        let db = Database::open_in_memory().unwrap();
        let (engine, recorder, _) = fixture(&db);
        for i in 0..3 {
            record(&recorder, &format!("dec_{i}"), 50.0, OutcomeType::NoImpact);
        }
        let state = engine.compute_updated_priors("t", "order", 90).unwrap();
        assert_eq!(state.updated_alpha, 2.0);
        assert_eq!(state.updated_beta, 5.0);
        assert!(!state.needs_recalibration);
    }

    #[test]
    fn test_overconfident_stream_lowers_alpha_and_flags_recalibration() {
        let db = Database::open_in_memory().unwrap();
        let (engine, recorder, _) = fixture(&db);
        // 10 outcomes predicted 90, only one materialized.
        for i in 0..9 {
            record(&recorder, &format!("dec_{i}"), 90.0, OutcomeType::NoImpact);
        }
        record(&recorder, "dec_9", 90.0, OutcomeType::LossOccurred);

        let state = engine.compute_updated_priors("t", "order", 90).unwrap();
        assert!(state.updated_alpha < state.prior_alpha);
        assert!(state.needs_recalibration);
        assert!(state.calibration_drift > 0.7);
        // shift = (0.1 - 2/7) × 0.3 × 10 ≈ -0.557
        assert!((state.updated_alpha - (2.0 - 0.557)).abs() < 0.01);
    }

    #[test]
    fn test_shift_is_capped() {
        let db = Database::open_in_memory().unwrap();
        let (engine, recorder, _) = fixture(&db);
        // 50 outcomes, all materialized: raw shift (1 - 0.2857)·0.3·50 ≈ 10.7 → capped at 5.
        for i in 0..50 {
            record(&recorder, &format!("dec_{i}"), 90.0, OutcomeType::LossOccurred);
        }
        let state = engine.compute_updated_priors("t", "order", 90).unwrap();
        assert!((state.updated_alpha - 7.0).abs() < 1e-9);
        assert!((state.updated_beta - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_apply_makes_priors_active() {
        let db = Database::open_in_memory().unwrap();
        let (engine, recorder, priors) = fixture(&db);
        for i in 0..10 {
            record(&recorder, &format!("dec_{i}"), 90.0, OutcomeType::LossOccurred);
        }
        let state = engine.compute_updated_priors("t", "order", 90).unwrap();
        assert!(priors.active_priors("t", "order").unwrap().is_none());

        engine.apply("t", &state).unwrap();
        let (alpha, beta) = priors.active_priors("t", "order").unwrap().unwrap();
        assert_eq!(alpha, state.updated_alpha);
        assert_eq!(beta, state.updated_beta);
    }

    #[test]
    fn test_learning_summary_status() {
        let db = Database::open_in_memory().unwrap();
        let (engine, recorder, _) = fixture(&db);
        let summary = engine.learning_summary("t").unwrap();
        assert_eq!(summary.flywheel_status, "collecting_data");

        for i in 0..6 {
            record(&recorder, &format!("dec_{i}"), 60.0, OutcomeType::NoImpact);
        }
        let summary = engine.learning_summary("t").unwrap();
        assert_eq!(summary.flywheel_status, "learning");
        assert_eq!(summary.entity_states.len(), 1);
    }
}
