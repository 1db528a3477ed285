//! Stage D — Bayesian updates with conjugate priors.
//!
//! Beta-Binomial for event probabilities and Normal-Normal for continuous
//! scores. Every posterior carries its prior and credible interval so the
//! computation can be re-derived from the trace.

use crate::config::Config;
use serde::{Deserialize, Serialize};

pub const MIN_OBSERVATIONS: usize = 5;
const CI_LEVEL: f64 = 0.95;

/// Result of a Beta-Binomial update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetaPosterior {
    pub alpha: f64,
    pub beta: f64,
    /// α / (α + β)
    pub mean: f64,
    pub variance: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub ci_level: f64,
    pub n_observations: usize,
    pub prior_alpha: f64,
    pub prior_beta: f64,
    /// Relative shift of the posterior mean away from the prior mean.
    pub data_influence: f64,
}

impl BetaPosterior {
    pub fn is_reliable(&self) -> bool {
        self.n_observations >= MIN_OBSERVATIONS
    }

    /// Width of the credible interval; smaller = more certain.
    pub fn uncertainty_width(&self) -> f64 {
        self.ci_upper - self.ci_lower
    }
}

/// Result of a Normal-Normal update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalPosterior {
    pub mean: f64,
    pub std: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub ci_level: f64,
    pub n_observations: usize,
    pub prior_mean: f64,
    pub prior_std: f64,
    pub data_influence: f64,
}

impl NormalPosterior {
    pub fn is_reliable(&self) -> bool {
        self.n_observations >= MIN_OBSERVATIONS
    }
}

/// A risk probability with uncertainty for an entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BayesianRiskScore {
    /// P(bad outcome), the posterior mean.
    pub risk_probability: f64,
    pub severity_score: f64,
    /// risk_probability × severity_score
    pub expected_loss: f64,
    pub confidence: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub n_observations: usize,
    pub is_reliable: bool,
}

/// Beta-Binomial risk scoring with configurable priors
#[derive(Debug, Clone)]
pub struct BayesianEngine {
    prior_alpha: f64,
    prior_beta: f64,
}

impl BayesianEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            prior_alpha: config.prior_alpha,
            prior_beta: config.prior_beta,
        }
    }

    pub fn with_priors(prior_alpha: f64, prior_beta: f64) -> Self {
        Self {
            prior_alpha,
            prior_beta,
        }
    }

    /// prior Beta(α, β) + k successes of n trials → Beta(α + k, β + n - k).
    pub fn beta_update(&self, successes: usize, failures: usize) -> BetaPosterior {
        self.beta_update_with(successes, failures, self.prior_alpha, self.prior_beta)
    }

    pub fn beta_update_with(
        &self,
        successes: usize,
        failures: usize,
        prior_alpha: f64,
        prior_beta: f64,
    ) -> BetaPosterior {
        let alpha = prior_alpha + successes as f64;
        let beta = prior_beta + failures as f64;
        let n = successes + failures;

        let mean = alpha / (alpha + beta);
        let variance = (alpha * beta) / ((alpha + beta).powi(2) * (alpha + beta + 1.0));

        let (ci_lower, ci_upper) = beta_credible_interval(alpha, beta);

        let prior_mean = prior_alpha / (prior_alpha + prior_beta);
        let data_influence = if n > 0 {
            (mean - prior_mean).abs() / prior_mean.max(1e-10)
        } else {
            0.0
        };

        BetaPosterior {
            alpha,
            beta,
            mean,
            variance,
            ci_lower,
            ci_upper,
            ci_level: CI_LEVEL,
            n_observations: n,
            prior_alpha,
            prior_beta,
            data_influence,
        }
    }

    /// Normal-Normal conjugate update for continuous risk scores.
    pub fn normal_update(
        &self,
        data_mean: f64,
        data_std: f64,
        n_observations: usize,
        prior_mean: f64,
        prior_std: f64,
    ) -> NormalPosterior {
        if n_observations == 0 || data_std <= 0.0 {
            let ci_half = 1.96 * prior_std;
            return NormalPosterior {
                mean: prior_mean,
                std: prior_std,
                ci_lower: prior_mean - ci_half,
                ci_upper: prior_mean + ci_half,
                ci_level: CI_LEVEL,
                n_observations: 0,
                prior_mean,
                prior_std,
                data_influence: 0.0,
            };
        }

        let prior_var = prior_std * prior_std;
        let data_var = data_std * data_std;
        let n = n_observations as f64;

        let post_var = 1.0 / (1.0 / prior_var + n / data_var);
        let post_mean = post_var * (prior_mean / prior_var + n * data_mean / data_var);
        let post_std = post_var.sqrt();

        NormalPosterior {
            mean: post_mean,
            std: post_std,
            ci_lower: post_mean - 1.96 * post_std,
            ci_upper: post_mean + 1.96 * post_std,
            ci_level: CI_LEVEL,
            n_observations,
            prior_mean,
            prior_std,
            data_influence: (post_mean - prior_mean).abs() / prior_mean.abs().max(1e-10),
        }
    }

    /// Full risk score: posterior probability × severity impact.
    pub fn compute_risk_score(
        &self,
        bad_outcomes: usize,
        good_outcomes: usize,
        severity: f64,
        prior_override: Option<(f64, f64)>,
    ) -> BayesianRiskScore {
        let posterior = match prior_override {
            Some((a, b)) => self.beta_update_with(bad_outcomes, good_outcomes, a, b),
            None => self.beta_update(bad_outcomes, good_outcomes),
        };

        // Wider credible interval = less confidence.
        let confidence = (1.0 - posterior.uncertainty_width()).clamp(0.0, 1.0);

        BayesianRiskScore {
            risk_probability: posterior.mean,
            severity_score: severity,
            expected_loss: posterior.mean * severity,
            confidence,
            ci_lower: posterior.ci_lower,
            ci_upper: posterior.ci_upper,
            n_observations: posterior.n_observations,
            is_reliable: posterior.is_reliable(),
        }
    }
}

/// Normal approximation for large α+β; a wider 2σ interval for small
/// samples. Both clamped to [0, 1].
fn beta_credible_interval(alpha: f64, beta: f64) -> (f64, f64) {
    let mean = alpha / (alpha + beta);
    let var = (alpha * beta) / ((alpha + beta).powi(2) * (alpha + beta + 1.0));
    let std = var.sqrt();
    let z = if alpha + beta > 50.0 { 1.96 } else { 2.0 };
    ((mean - z * std).max(0.0), (mean + z * std).min(1.0))
}
