//! Shared domain types.
//!
//! The `SignalEvent` envelope is the wire contract with the upstream OMEN
//! producer — field names must match its output exactly.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp formatting used for every persisted timestamp. One fixed format
/// keeps lexicographic ordering equal to chronological ordering in SQLite.
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Severity bands over a 0-100 risk score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl SeverityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityLevel::Low => "low",
            SeverityLevel::Moderate => "moderate",
            SeverityLevel::High => "high",
            SeverityLevel::Critical => "critical",
        }
    }
}

/// Data freshness classification for an aggregate of signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Aging,
    Stale,
}

impl Freshness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Freshness::Fresh => "fresh",
            Freshness::Aging => "aging",
            Freshness::Stale => "stale",
        }
    }
}

// ── OMEN wire contract ───────────────────────────────────────────────────

/// Geographic scope of a signal
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeographicInfo {
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub chokepoints: Vec<String>,
}

/// Temporal scope — when the event is expected
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemporalInfo {
    #[serde(default)]
    pub event_horizon: Option<String>,
    #[serde(default)]
    pub resolution_date: Option<String>,
}

/// Single evidence source backing a signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub source: String,
    pub source_type: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub retrieved_at: Option<String>,
}

/// The inner `signal` object inside a `SignalEvent`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalPayload {
    pub signal_id: String,
    #[serde(default)]
    pub source_event_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub probability: f64,
    #[serde(default)]
    pub probability_source: Option<String>,
    pub confidence_score: f64,
    /// HIGH / MEDIUM / LOW
    #[serde(default)]
    pub confidence_level: Option<String>,
    /// GEOPOLITICAL, ECONOMIC, WEATHER, SUPPLY_CHAIN, ...
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub geographic: Option<GeographicInfo>,
    #[serde(default)]
    pub temporal: Option<TemporalInfo>,
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub ruleset_version: Option<String>,
    pub generated_at: DateTime<Utc>,
}

fn default_schema_version() -> String {
    "1.0.0".to_string()
}

/// Top-level envelope that OMEN POSTs to `/api/v1/signals/ingest`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEvent {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub signal_id: String,
    #[serde(default)]
    pub deterministic_trace_id: Option<String>,
    #[serde(default)]
    pub input_event_hash: Option<String>,
    #[serde(default)]
    pub source_event_id: Option<String>,
    #[serde(default)]
    pub ruleset_version: Option<String>,
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub emitted_at: Option<DateTime<Utc>>,
    pub signal: SignalPayload,
}

/// Successful ingest acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestAck {
    pub ack_id: String,
    #[serde(default)]
    pub duplicate: bool,
}

// ── Internal signals (consumed by the risk engine) ───────────────────────

/// Normalized, per-entity signal row. Unique per
/// (tenant, source, signal_type, entity_type, entity_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalSignal {
    pub id: String,
    pub tenant_id: String,
    pub source: String,
    pub signal_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub confidence: f64,
    pub severity_score: f64,
    pub evidence: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
