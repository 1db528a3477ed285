//! Application configuration.
//!
//! Loaded once at startup from `.env` / environment variables. Every numeric
//! knob the engines use lives here so nothing is hard-coded at call sites.

use std::collections::HashMap;
use std::env;

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(default)
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // ── Server ───────────────────────────────────────────────────────
    pub database_path: String,
    pub port: u16,
    pub jwt_secret: String,

    /// Maps API keys to the tenant they belong to.
    /// Env format: `RISKCAST_API_KEYS=key1:tenant-a,key2:tenant-b`
    pub api_keys: HashMap<String, String>,

    // ── Rate limiting ────────────────────────────────────────────────
    pub rate_limit_default: u32,
    pub rate_limit_burst: u32,

    // ── Timeouts (seconds) ───────────────────────────────────────────
    pub store_timeout_secs: u64,
    pub upstream_timeout_secs: u64,
    pub cache_timeout_secs: u64,
    pub upstream_url: String,

    // ── Bayesian priors ──────────────────────────────────────────────
    pub prior_alpha: f64,
    pub prior_beta: f64,

    // ── Ensemble model weights ───────────────────────────────────────
    pub ensemble_weight_fusion: f64,
    pub ensemble_weight_bayesian: f64,

    // ── Severity bands ───────────────────────────────────────────────
    pub severity_critical_threshold: f64,
    pub severity_high_threshold: f64,
    pub severity_moderate_threshold: f64,

    // ── Escalation ───────────────────────────────────────────────────
    pub escalation_exposure_threshold: f64,
    pub escalation_confidence_floor: f64,
    pub escalation_risk_ceiling: f64,
    pub escalation_disagreement_threshold: f64,

    // ── Temporal decay half-lives (hours) ────────────────────────────
    pub halflife_payment_risk: f64,
    pub halflife_route_disruption: f64,
    pub halflife_order_risk: f64,
    pub halflife_market_volatility: f64,
    pub halflife_port_closure: f64,
    pub halflife_weather_alert: f64,
    pub halflife_default: f64,
    pub temporal_min_weight: f64,

    // ── Correlation ──────────────────────────────────────────────────
    pub correlation_threshold: f64,
    pub correlation_discount: f64,

    // ── Flywheel ─────────────────────────────────────────────────────
    pub flywheel_learning_rate: f64,
    pub flywheel_min_outcomes: usize,
    pub flywheel_drift_threshold: f64,
    pub flywheel_max_shift: f64,

    // ── Pipeline health ──────────────────────────────────────────────
    pub freshness_stale_minutes: i64,
    pub freshness_outdated_minutes: i64,
    pub gap_threshold_minutes: i64,

    // ── Decisions ────────────────────────────────────────────────────
    /// Scale factor for non-order exposure estimates (avg severity × this).
    pub exposure_scale_usd: f64,
    pub decision_valid_hours: i64,

    // ── Alerting ─────────────────────────────────────────────────────
    pub alert_on_ingest: bool,
    pub alert_on_decision: bool,
    pub alert_queue_depth: usize,

    // ── Calibration ──────────────────────────────────────────────────
    /// When true, the fitted Platt scaler post-processes the returned
    /// probability. Off by default; calibration stays advisory.
    pub calibration_live: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let api_keys = env_string("RISKCAST_API_KEYS", "dev-api-key:dev-tenant")
            .split(',')
            .filter_map(|pair| {
                let (key, tenant) = pair.trim().split_once(':')?;
                Some((key.to_string(), tenant.to_string()))
            })
            .collect();

        Ok(Self {
            database_path: env_string("DATABASE_PATH", "./riskcast.db"),
            port: env_parse("PORT", 8001u16),
            jwt_secret: env_string("JWT_SECRET", "dev-jwt-secret-change-in-production"),
            api_keys,

            rate_limit_default: env_parse("RATE_LIMIT_DEFAULT", 100u32),
            rate_limit_burst: env_parse("RATE_LIMIT_BURST", 20u32),

            store_timeout_secs: env_parse("STORE_TIMEOUT_SECONDS", 5u64),
            upstream_timeout_secs: env_parse("UPSTREAM_TIMEOUT_SECONDS", 10u64),
            cache_timeout_secs: env_parse("CACHE_TIMEOUT_SECONDS", 2u64),
            upstream_url: env_string("OMEN_URL", "http://localhost:8000"),

            prior_alpha: env_parse("PRIOR_ALPHA", 2.0),
            prior_beta: env_parse("PRIOR_BETA", 5.0),

            ensemble_weight_fusion: env_parse("ENSEMBLE_WEIGHT_FUSION", 0.6),
            ensemble_weight_bayesian: env_parse("ENSEMBLE_WEIGHT_BAYESIAN", 0.4),

            severity_critical_threshold: env_parse("SEVERITY_CRITICAL_THRESHOLD", 75.0),
            severity_high_threshold: env_parse("SEVERITY_HIGH_THRESHOLD", 50.0),
            severity_moderate_threshold: env_parse("SEVERITY_MODERATE_THRESHOLD", 25.0),

            escalation_exposure_threshold: env_parse("ESCALATION_EXPOSURE_THRESHOLD", 200_000.0),
            escalation_confidence_floor: env_parse("ESCALATION_CONFIDENCE_FLOOR", 0.5),
            escalation_risk_ceiling: env_parse("ESCALATION_RISK_CEILING", 80.0),
            escalation_disagreement_threshold: env_parse("ESCALATION_DISAGREEMENT_THRESHOLD", 15.0),

            halflife_payment_risk: env_parse("HALFLIFE_PAYMENT_RISK", 720.0),
            halflife_route_disruption: env_parse("HALFLIFE_ROUTE_DISRUPTION", 168.0),
            halflife_order_risk: env_parse("HALFLIFE_ORDER_RISK", 336.0),
            halflife_market_volatility: env_parse("HALFLIFE_MARKET_VOLATILITY", 72.0),
            halflife_port_closure: env_parse("HALFLIFE_PORT_CLOSURE", 48.0),
            halflife_weather_alert: env_parse("HALFLIFE_WEATHER_ALERT", 24.0),
            halflife_default: env_parse("HALFLIFE_DEFAULT", 168.0),
            temporal_min_weight: env_parse("TEMPORAL_MIN_WEIGHT", 0.01),

            correlation_threshold: env_parse("CORRELATION_THRESHOLD", 0.5),
            correlation_discount: env_parse("CORRELATION_DISCOUNT", 0.5),

            flywheel_learning_rate: env_parse("FLYWHEEL_LEARNING_RATE", 0.3),
            flywheel_min_outcomes: env_parse("FLYWHEEL_MIN_OUTCOMES", 5usize),
            flywheel_drift_threshold: env_parse("FLYWHEEL_DRIFT_THRESHOLD", 0.15),
            flywheel_max_shift: env_parse("FLYWHEEL_MAX_SHIFT", 5.0),

            freshness_stale_minutes: env_parse("FRESHNESS_STALE_MINUTES", 60i64),
            freshness_outdated_minutes: env_parse("FRESHNESS_OUTDATED_MINUTES", 360i64),
            gap_threshold_minutes: env_parse("GAP_THRESHOLD_MINUTES", 120i64),

            exposure_scale_usd: env_parse("EXPOSURE_SCALE_USD", 1000.0),
            decision_valid_hours: env_parse("DECISION_VALID_HOURS", 24i64),

            alert_on_ingest: env_bool("ALERT_ON_INGEST", true),
            alert_on_decision: env_bool("ALERT_ON_DECISION", true),
            alert_queue_depth: env_parse("ALERT_QUEUE_DEPTH", 256usize),

            calibration_live: env_bool("CALIBRATION_LIVE", false),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env().expect("default config")
    }
}
