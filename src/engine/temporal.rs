//! Stage A — temporal decay.
//!
//! Signals lose relevance over time: weight = e^(-λt) with λ = ln2 / H,
//! half-life H configured per signal type. Signals below the minimum weight
//! are expired and excluded from aggregation.

use crate::config::Config;
use crate::models::Freshness;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A signal with its decay weight applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayedSignal {
    pub signal_type: String,
    pub original_score: f64,
    pub decayed_score: f64,
    /// 1 = fresh, 0 = expired
    pub decay_weight: f64,
    pub age_hours: f64,
    pub half_life_hours: f64,
    pub is_expired: bool,
}

/// Result of time-weighted aggregation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalAggregation {
    pub weighted_score: f64,
    pub n_active: usize,
    pub n_expired: usize,
    pub avg_age_hours: f64,
    pub freshness: Freshness,
    pub signals: Vec<DecayedSignal>,
}

/// Exponential time decay over risk signals
#[derive(Debug, Clone)]
pub struct TemporalDecayEngine {
    half_lives: HashMap<String, f64>,
    default_half_life: f64,
    min_weight: f64,
}

impl TemporalDecayEngine {
    pub fn new(config: &Config) -> Self {
        let half_lives = HashMap::from([
            ("payment_risk".to_string(), config.halflife_payment_risk),
            ("route_disruption".to_string(), config.halflife_route_disruption),
            ("order_risk_composite".to_string(), config.halflife_order_risk),
            ("market_volatility".to_string(), config.halflife_market_volatility),
            ("port_closure".to_string(), config.halflife_port_closure),
            ("weather_alert".to_string(), config.halflife_weather_alert),
        ]);
        Self {
            half_lives,
            default_half_life: config.halflife_default,
            min_weight: config.temporal_min_weight,
        }
    }

    pub fn compute_decay(
        &self,
        signal_type: &str,
        severity_score: f64,
        signal_timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DecayedSignal {
        let age_hours = (now - signal_timestamp).num_seconds() as f64 / 3600.0;
        let half_life = self
            .half_lives
            .get(signal_type)
            .copied()
            .unwrap_or(self.default_half_life);

        let decay_lambda = std::f64::consts::LN_2 / half_life;
        // Clamp negative ages (clock skew) to a weight of 1.
        let weight = (-decay_lambda * age_hours.max(0.0)).exp().min(1.0);
        let is_expired = weight < self.min_weight;

        DecayedSignal {
            signal_type: signal_type.to_string(),
            original_score: severity_score,
            decayed_score: severity_score * weight,
            decay_weight: weight,
            age_hours,
            half_life_hours: half_life,
            is_expired,
        }
    }

    /// Aggregate signals with decay. Expired signals are excluded; the rest
    /// are weighted by freshness.
    pub fn aggregate(
        &self,
        signals: &[(String, f64, DateTime<Utc>)],
        now: DateTime<Utc>,
    ) -> TemporalAggregation {
        let decayed: Vec<DecayedSignal> = signals
            .iter()
            .map(|(ty, score, ts)| self.compute_decay(ty, *score, *ts, now))
            .collect();

        let active: Vec<&DecayedSignal> = decayed.iter().filter(|d| !d.is_expired).collect();
        let n_expired = decayed.len() - active.len();

        let (weighted_score, avg_age) = if active.is_empty() {
            (0.0, 0.0)
        } else {
            let total_weight: f64 = active.iter().map(|d| d.decay_weight).sum();
            let score = active
                .iter()
                .map(|d| d.decayed_score * d.decay_weight)
                .sum::<f64>()
                / total_weight;
            let age = active.iter().map(|d| d.age_hours).sum::<f64>() / active.len() as f64;
            (score, age)
        };

        let freshness = if active.is_empty() {
            Freshness::Stale
        } else if avg_age < 24.0 {
            Freshness::Fresh
        } else if avg_age < 168.0 {
            Freshness::Aging
        } else {
            Freshness::Stale
        };

        TemporalAggregation {
            weighted_score,
            n_active: active.len(),
            n_expired,
            avg_age_hours: avg_age,
            freshness,
            signals: decayed,
        }
    }
}
