//! Deep signal validation, beyond what deserialization enforces.
//!
//! Checks content quality (title, evidence), temporal validity, category and
//! confidence-level consistency, and numeric bounds. Produces a quality
//! score in [0, 1] plus an issues list; `error`-severity issues reject the
//! signal at the ingest boundary.

use crate::models::SignalEvent;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const MAX_SIGNAL_AGE_HOURS: f64 = 168.0;
const MIN_TITLE_LENGTH: usize = 10;
const MAX_TITLE_LENGTH: usize = 500;

const VALID_CATEGORIES: &[&str] = &[
    "GEOPOLITICAL",
    "ECONOMIC",
    "WEATHER",
    "SUPPLY_CHAIN",
    "REGULATORY",
    "LABOR",
    "INFRASTRUCTURE",
    "SECURITY",
    "MARKET",
    "HEALTH",
    "ENVIRONMENTAL",
    "TECHNOLOGY",
];

const VALID_CONFIDENCE_LEVELS: &[&str] = &["HIGH", "MEDIUM", "LOW"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    pub severity: IssueSeverity,
}

impl ValidationIssue {
    fn new(field: &str, message: impl Into<String>, severity: IssueSeverity) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
            severity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub signal_id: String,
    pub is_valid: bool,
    pub quality_score: f64,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error)
    }

    pub fn first_error(&self) -> Option<&ValidationIssue> {
        self.errors().next()
    }
}

/// Validator for incoming OMEN signals
#[derive(Debug, Clone, Default)]
pub struct SignalValidator;

impl SignalValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, event: &SignalEvent) -> ValidationResult {
        let mut issues: Vec<ValidationIssue> = Vec::new();
        let sig = &event.signal;

        // Signal id format
        if event.signal_id.len() < 5 {
            issues.push(ValidationIssue::new(
                "signal_id",
                "signal id is too short (min 5 chars)",
                IssueSeverity::Error,
            ));
        }
        if event.signal_id != sig.signal_id {
            issues.push(ValidationIssue::new(
                "signal_id",
                format!(
                    "envelope signal_id ({}) != payload signal_id ({})",
                    event.signal_id, sig.signal_id
                ),
                IssueSeverity::Error,
            ));
        }

        // Numeric bounds
        if !(0.0..=1.0).contains(&sig.probability) {
            issues.push(ValidationIssue::new(
                "signal.probability",
                format!("probability {} outside [0, 1]", sig.probability),
                IssueSeverity::Error,
            ));
        }
        if !(0.0..=1.0).contains(&sig.confidence_score) {
            issues.push(ValidationIssue::new(
                "signal.confidence_score",
                format!("confidence_score {} outside [0, 1]", sig.confidence_score),
                IssueSeverity::Error,
            ));
        }

        // Title quality
        if sig.title.len() < MIN_TITLE_LENGTH {
            issues.push(ValidationIssue::new(
                "signal.title",
                format!(
                    "title too short ({} chars, min {MIN_TITLE_LENGTH})",
                    sig.title.len()
                ),
                IssueSeverity::Warning,
            ));
        }
        if sig.title.len() > MAX_TITLE_LENGTH {
            issues.push(ValidationIssue::new(
                "signal.title",
                format!(
                    "title too long ({} chars, max {MAX_TITLE_LENGTH})",
                    sig.title.len()
                ),
                IssueSeverity::Warning,
            ));
        }

        // Category
        if !VALID_CATEGORIES.contains(&sig.category.to_uppercase().as_str()) {
            issues.push(ValidationIssue::new(
                "signal.category",
                format!("unknown category '{}'", sig.category),
                IssueSeverity::Warning,
            ));
        }

        // Confidence level consistency
        if let Some(level) = &sig.confidence_level {
            let upper = level.to_uppercase();
            if !VALID_CONFIDENCE_LEVELS.contains(&upper.as_str()) {
                issues.push(ValidationIssue::new(
                    "signal.confidence_level",
                    format!("unknown confidence_level '{level}'"),
                    IssueSeverity::Warning,
                ));
            }
            let expected = score_to_level(sig.confidence_score);
            if upper != expected {
                issues.push(ValidationIssue::new(
                    "signal.confidence_level",
                    format!(
                        "confidence_level '{level}' inconsistent with score {:.2} (expected '{expected}')",
                        sig.confidence_score
                    ),
                    IssueSeverity::Info,
                ));
            }
        }

        // Probability/confidence consistency
        if sig.probability == 0.0 && sig.confidence_score > 0.5 {
            issues.push(ValidationIssue::new(
                "signal.probability",
                "probability is 0 but confidence is high",
                IssueSeverity::Warning,
            ));
        }

        // Temporal validity
        if let Some(observed) = event.observed_at {
            let age_hours = (Utc::now() - observed).num_seconds() as f64 / 3600.0;
            if age_hours > MAX_SIGNAL_AGE_HOURS {
                issues.push(ValidationIssue::new(
                    "observed_at",
                    format!("signal is {age_hours:.0}h old (max {MAX_SIGNAL_AGE_HOURS:.0}h)"),
                    IssueSeverity::Warning,
                ));
            }
            // Allow an hour of clock skew before calling it impossible.
            if age_hours < -1.0 {
                issues.push(ValidationIssue::new(
                    "observed_at",
                    "signal observed_at is in the future",
                    IssueSeverity::Error,
                ));
            }
        }

        // Evidence
        if sig.evidence.is_empty() {
            issues.push(ValidationIssue::new(
                "signal.evidence",
                "no evidence items provided",
                IssueSeverity::Info,
            ));
        }
        for (i, ev) in sig.evidence.iter().enumerate() {
            if ev.source.is_empty() {
                issues.push(ValidationIssue::new(
                    &format!("signal.evidence[{i}].source"),
                    "evidence source is empty",
                    IssueSeverity::Warning,
                ));
            }
        }

        // Schema version
        if !matches!(event.schema_version.as_str(), "1.0.0" | "1.1.0" | "2.0.0") {
            issues.push(ValidationIssue::new(
                "schema_version",
                format!("unexpected schema_version '{}'", event.schema_version),
                IssueSeverity::Info,
            ));
        }

        let quality_score = compute_quality(event, &issues);
        let is_valid = !issues.iter().any(|i| i.severity == IssueSeverity::Error);

        if !is_valid {
            warn!(
                signal_id = %event.signal_id,
                errors = issues.iter().filter(|i| i.severity == IssueSeverity::Error).count(),
                "signal validation failed"
            );
        } else {
            debug!(
                signal_id = %event.signal_id,
                quality = quality_score,
                "signal validated"
            );
        }

        ValidationResult {
            signal_id: event.signal_id.clone(),
            is_valid,
            quality_score,
            issues,
        }
    }
}

fn score_to_level(score: f64) -> &'static str {
    if score >= 0.7 {
        "HIGH"
    } else if score >= 0.4 {
        "MEDIUM"
    } else {
        "LOW"
    }
}

fn compute_quality(event: &SignalEvent, issues: &[ValidationIssue]) -> f64 {
    let sig = &event.signal;
    let mut score: f64 = 0.5;

    let errors = issues
        .iter()
        .filter(|i| i.severity == IssueSeverity::Error)
        .count() as f64;
    let warnings = issues
        .iter()
        .filter(|i| i.severity == IssueSeverity::Warning)
        .count() as f64;
    score -= errors * 0.2;
    score -= warnings * 0.03;

    if sig.evidence.len() >= 1 {
        score += 0.05;
    }
    if sig.evidence.len() >= 2 {
        score += 0.05;
    }
    if sig.evidence.len() >= 5 {
        score += 0.05;
    }

    if sig.description.as_ref().is_some_and(|d| d.len() > 10) {
        score += 0.05;
    }
    if sig.description.as_ref().is_some_and(|d| d.len() > 50) {
        score += 0.05;
    }

    if sig
        .geographic
        .as_ref()
        .is_some_and(|g| !g.regions.is_empty())
    {
        score += 0.05;
    }
    if sig
        .geographic
        .as_ref()
        .is_some_and(|g| !g.chokepoints.is_empty())
    {
        score += 0.05;
    }

    if sig
        .temporal
        .as_ref()
        .is_some_and(|t| t.event_horizon.is_some())
    {
        score += 0.05;
    }

    if sig.tags.len() >= 2 {
        score += 0.05;
    }

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalPayload;

    fn event() -> SignalEvent {
        SignalEvent {
            schema_version: "1.0.0".to_string(),
            signal_id: "OMEN-LIVE2C94D4C2".to_string(),
            deterministic_trace_id: None,
            input_event_hash: None,
            source_event_id: None,
            ruleset_version: None,
            observed_at: Some(Utc::now()),
            emitted_at: None,
            signal: SignalPayload {
                signal_id: "OMEN-LIVE2C94D4C2".to_string(),
                source_event_id: None,
                title: "Red Sea transit insurance premiums doubled".to_string(),
                description: Some("Underwriters repriced war-risk cover overnight.".to_string()),
                probability: 0.65,
                probability_source: None,
                confidence_score: 0.8,
                confidence_level: Some("HIGH".to_string()),
                category: "GEOPOLITICAL".to_string(),
                tags: vec!["red-sea".to_string(), "insurance".to_string()],
                geographic: None,
                temporal: None,
                evidence: vec![],
                trace_id: None,
                ruleset_version: None,
                generated_at: Utc::now(),
            },
        }
    }

    #[test]
    fn test_clean_signal_passes() {
        let result = SignalValidator::new().validate(&event());
        assert!(result.is_valid);
        assert!(result.quality_score > 0.5);
    }

    #[test]
    fn test_mismatched_envelope_id_is_error() {
        let mut e = event();
        e.signal.signal_id = "OMEN-OTHER".to_string();
        let result = SignalValidator::new().validate(&e);
        assert!(!result.is_valid);
        assert!(result.first_error().unwrap().field.contains("signal_id"));
    }

    #[test]
    fn test_out_of_bounds_probability_is_error() {
        let mut e = event();
        e.signal.probability = 1.4;
        let result = SignalValidator::new().validate(&e);
        assert!(!result.is_valid);
    }

    #[test]
    fn test_future_observed_at_is_error() {
        let mut e = event();
        e.observed_at = Some(Utc::now() + chrono::Duration::hours(6));
        let result = SignalValidator::new().validate(&e);
        assert!(!result.is_valid);
    }

    #[test]
    fn test_unknown_category_is_only_warning() {
        let mut e = event();
        e.signal.category = "ASTROLOGY".to_string();
        let result = SignalValidator::new().validate(&e);
        assert!(result.is_valid);
        assert!(result
            .issues
            .iter()
            .any(|i| i.severity == IssueSeverity::Warning));
    }
}
