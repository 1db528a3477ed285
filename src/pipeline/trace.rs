//! Signal-to-decision traceability.
//!
//! Reconstructs the chain ledger receipt → primary-store record for a
//! signal, decision → outcome for a decision, and reports pipeline-wide
//! trace coverage.

use crate::db::SignalStore;
use crate::ledger::LedgerStore;
use crate::models::fmt_ts;
use crate::outcomes::recorder::OutcomeStore;
use anyhow::Result;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub step: String,
    pub id: String,
    pub timestamp: String,
    pub status: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceChain {
    pub trace_id: String,
    pub signal_id: String,
    pub steps: Vec<TraceStep>,
    pub is_complete: bool,
    pub missing_steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTrace {
    pub trace_id: String,
    pub decision_id: String,
    pub outcome: Option<serde_json::Value>,
    pub is_complete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineCoverage {
    pub period_hours: i64,
    pub total_in_ledger: usize,
    pub total_ingested: usize,
    pub total_failed: i64,
    pub ingest_coverage: f64,
    pub needs_reconciliation: bool,
}

#[derive(Clone)]
pub struct Tracer {
    ledger: LedgerStore,
    signals: SignalStore,
    outcomes: OutcomeStore,
}

impl Tracer {
    pub fn new(ledger: LedgerStore, signals: SignalStore, outcomes: OutcomeStore) -> Self {
        Self {
            ledger,
            signals,
            outcomes,
        }
    }

    pub fn trace_signal(&self, tenant_id: &str, signal_id: &str) -> Result<TraceChain> {
        let trace_id = new_trace_id();
        let mut steps: Vec<TraceStep> = Vec::new();
        let mut missing: Vec<String> = Vec::new();

        match self.ledger.latest_for_signal(tenant_id, signal_id)? {
            Some(entry) => steps.push(TraceStep {
                step: "ledger_receipt".to_string(),
                id: entry.id.clone(),
                timestamp: fmt_ts(entry.recorded_at),
                status: entry.status.as_str().to_string(),
                data: serde_json::json!({
                    "signal_id": entry.signal_id,
                    "ack_id": entry.ack_id,
                    "status": entry.status.as_str(),
                }),
            }),
            None => missing.push("ledger_receipt".to_string()),
        }

        match self.signals.find_by_signal_id(tenant_id, signal_id)? {
            Some(row) => steps.push(TraceStep {
                step: "ingest_record".to_string(),
                id: row.id.clone(),
                timestamp: fmt_ts(row.ingested_at),
                status: if row.processed {
                    "processed".to_string()
                } else {
                    "ingested".to_string()
                },
                data: serde_json::json!({
                    "signal_id": row.signal_id,
                    "ack_id": row.ack_id,
                    "category": row.category,
                    "title": row.title,
                    "probability": row.probability,
                    "confidence_score": row.confidence_score,
                    "is_active": row.is_active,
                    "processed": row.processed,
                }),
            }),
            None => missing.push("ingest_record".to_string()),
        }

        let chain = TraceChain {
            trace_id: trace_id.clone(),
            signal_id: signal_id.to_string(),
            is_complete: missing.is_empty(),
            missing_steps: missing,
            steps,
        };

        info!(
            trace_id = %trace_id,
            signal_id = %signal_id,
            steps = chain.steps.len(),
            is_complete = chain.is_complete,
            "signal traced"
        );

        Ok(chain)
    }

    /// Trace a decision forward to its outcome record, if any.
    pub fn trace_decision(&self, tenant_id: &str, decision_id: &str) -> Result<DecisionTrace> {
        let outcome = self.outcomes.get_by_decision(tenant_id, decision_id)?;
        let is_complete = outcome.is_some();
        Ok(DecisionTrace {
            trace_id: new_trace_id(),
            decision_id: decision_id.to_string(),
            outcome: outcome.map(|o| {
                serde_json::json!({
                    "outcome_type": o.outcome_type,
                    "actual_loss_usd": o.actual_loss_usd,
                    "predicted_loss_usd": o.predicted_loss_usd,
                    "risk_materialized": o.risk_materialized,
                    "was_accurate": o.was_accurate,
                    "value_generated_usd": o.value_generated_usd,
                    "recorded_at": o.recorded_at,
                })
            }),
            is_complete,
        })
    }

    pub fn pipeline_coverage(&self, tenant_id: &str, hours_back: i64) -> Result<PipelineCoverage> {
        let cutoff = Utc::now() - Duration::hours(hours_back);

        let ledger_ids = self.ledger.signal_ids_since(tenant_id, cutoff)?;
        let total_ledger = ledger_ids.len();
        let total_ingested = self.signals.signal_ids_since(tenant_id, cutoff)?.len();
        let total_failed = self.ledger.failed_count_since(tenant_id, cutoff)?;

        let ingest_coverage = total_ingested as f64 / total_ledger.max(1) as f64;

        Ok(PipelineCoverage {
            period_hours: hours_back,
            total_in_ledger: total_ledger,
            total_ingested,
            total_failed,
            ingest_coverage,
            needs_reconciliation: total_ledger as i64 > total_ingested as i64 + total_failed,
        })
    }
}

fn new_trace_id() -> String {
    format!("trace_{}", &uuid::Uuid::new_v4().simple().to_string()[..12])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::db::Database;
    use crate::ingest::IngestService;
    use crate::models::{SignalEvent, SignalPayload};

    fn event(signal_id: &str) -> SignalEvent {
        SignalEvent {
            schema_version: "1.0.0".to_string(),
            signal_id: signal_id.to_string(),
            deterministic_trace_id: None,
            input_event_hash: None,
            source_event_id: None,
            ruleset_version: None,
            observed_at: None,
            emitted_at: None,
            signal: SignalPayload {
                signal_id: signal_id.to_string(),
                source_event_id: None,
                title: "Rail corridor capacity cut by maintenance".to_string(),
                description: None,
                probability: 0.45,
                probability_source: None,
                confidence_score: 0.65,
                confidence_level: None,
                category: "INFRASTRUCTURE".to_string(),
                tags: vec![],
                geographic: None,
                temporal: None,
                evidence: vec![],
                trace_id: None,
                ruleset_version: None,
                generated_at: Utc::now(),
            },
        }
    }

    fn fixture(db: &Database) -> (Tracer, LedgerStore, IngestService) {
        let ledger = LedgerStore::new(db.clone());
        let signals = SignalStore::new(db.clone());
        let ingest = IngestService::new(
            ledger.clone(),
            signals.clone(),
            AuditLog::new(db.clone()),
            None,
        );
        let tracer = Tracer::new(ledger.clone(), signals, OutcomeStore::new(db.clone()));
        (tracer, ledger, ingest)
    }

    #[test]
    fn test_full_chain_is_complete() {
        let db = Database::open_in_memory().unwrap();
        let (tracer, _, ingest) = fixture(&db);
        ingest.ingest("t", &event("OMEN-T-1")).unwrap();

        let chain = tracer.trace_signal("t", "OMEN-T-1").unwrap();
        assert!(chain.is_complete);
        assert_eq!(chain.steps.len(), 2);
        assert_eq!(chain.steps[0].step, "ledger_receipt");
        assert_eq!(chain.steps[1].step, "ingest_record");
    }

    #[test]
    fn test_ledger_only_chain_reports_missing_step() {
        let db = Database::open_in_memory().unwrap();
        let (tracer, ledger, _) = fixture(&db);
        ledger.record("t", &event("OMEN-T-2")).unwrap();

        let chain = tracer.trace_signal("t", "OMEN-T-2").unwrap();
        assert!(!chain.is_complete);
        assert_eq!(chain.missing_steps, vec!["ingest_record"]);
    }

    #[test]
    fn test_coverage_flags_reconciliation_need() {
        let db = Database::open_in_memory().unwrap();
        let (tracer, ledger, ingest) = fixture(&db);
        ingest.ingest("t", &event("OMEN-T-3")).unwrap();
        ledger.record("t", &event("OMEN-T-4")).unwrap(); // never ingested

        let coverage = tracer.pipeline_coverage("t", 24).unwrap();
        assert_eq!(coverage.total_in_ledger, 2);
        assert_eq!(coverage.total_ingested, 1);
        assert!(coverage.needs_reconciliation);
        assert!((coverage.ingest_coverage - 0.5).abs() < 1e-9);
    }
}
