//! Signal ingest pipeline.
//!
//! Flow: validate → idempotency probe → ledger record → primary insert →
//! ledger ack → alert hook. The ledger write commits before the primary
//! insert starts; a primary failure leaves a `failed` ledger entry for the
//! reconciler to replay. Dedup on `signal_id` makes retries and replays
//! idempotent (at-least-once delivery, exactly-once identity).

pub mod validator;

pub use validator::{SignalValidator, ValidationResult};

use crate::alerts::{Alert, AlertDispatcher, AlertSource};
use crate::audit::{AuditEvent, AuditLog};
use crate::db::SignalStore;
use crate::errors::ApiError;
use crate::ledger::LedgerStore;
use crate::models::{IngestAck, SignalEvent};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info};

const ALERT_SEVERITY_FLOOR: f64 = 70.0;

/// In-memory ingest counters, also exported as Prometheus counters.
#[derive(Debug, Default)]
pub struct IngestCounters {
    pub received: AtomicU64,
    pub ingested: AtomicU64,
    pub duplicates: AtomicU64,
    pub errors: AtomicU64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestCountersSnapshot {
    pub total_received: u64,
    pub total_ingested: u64,
    pub total_duplicates: u64,
    pub total_errors: u64,
}

impl IngestCounters {
    pub fn snapshot(&self) -> IngestCountersSnapshot {
        IngestCountersSnapshot {
            total_received: self.received.load(Ordering::Relaxed),
            total_ingested: self.ingested.load(Ordering::Relaxed),
            total_duplicates: self.duplicates.load(Ordering::Relaxed),
            total_errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Ingest pipeline for OMEN signals
#[derive(Clone)]
pub struct IngestService {
    ledger: LedgerStore,
    signals: SignalStore,
    validator: SignalValidator,
    audit: AuditLog,
    alerts: Option<AlertDispatcher>,
    counters: Arc<IngestCounters>,
}

impl IngestService {
    pub fn new(
        ledger: LedgerStore,
        signals: SignalStore,
        audit: AuditLog,
        alerts: Option<AlertDispatcher>,
    ) -> Self {
        Self {
            ledger,
            signals,
            validator: SignalValidator::new(),
            audit,
            alerts,
            counters: Arc::new(IngestCounters::default()),
        }
    }

    pub fn counters(&self) -> Arc<IngestCounters> {
        Arc::clone(&self.counters)
    }

    /// Ingest a signal event. Returns the ack and whether it was a
    /// duplicate (the HTTP layer maps duplicates to 409).
    pub fn ingest(
        &self,
        tenant_id: &str,
        event: &SignalEvent,
    ) -> Result<(IngestAck, bool), ApiError> {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("riskcast_ingest_total_received", 1);

        let validation = self.validator.validate(event);
        if let Some(issue) = validation.first_error() {
            return Err(ApiError::validation(
                issue.field.clone(),
                issue.message.clone(),
            ));
        }

        // Idempotency probe first: retries of an already-ingested signal
        // must not grow the ledger.
        if let Some(ack_id) = self
            .signals
            .find_ack(tenant_id, &event.signal_id)
            .map_err(ApiError::Internal)?
        {
            self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("riskcast_ingest_total_duplicates", 1);
            info!(signal_id = %event.signal_id, ack_id = %ack_id, "duplicate signal");
            return Ok((
                IngestAck {
                    ack_id,
                    duplicate: true,
                },
                true,
            ));
        }

        // First durable write.
        let entry = self
            .ledger
            .record(tenant_id, event)
            .map_err(ApiError::Internal)?;

        let ack_id = new_ack_id();
        match self.signals.insert(tenant_id, event, &ack_id) {
            Ok(()) => {
                self.ledger
                    .mark_ingested(&entry.id, &ack_id)
                    .map_err(ApiError::Internal)?;
                self.counters.ingested.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("riskcast_ingest_total_ingested", 1);

                info!(
                    signal_id = %event.signal_id,
                    ack_id = %ack_id,
                    category = %event.signal.category,
                    "signal ingested"
                );

                self.audit.record_best_effort(
                    AuditEvent::new("signal_ingested")
                        .tenant(tenant_id)
                        .resource("signal", event.signal_id.clone()),
                );
                self.fire_alert_hook(tenant_id, event);

                Ok((
                    IngestAck {
                        ack_id,
                        duplicate: false,
                    },
                    false,
                ))
            }
            Err(err) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("riskcast_ingest_total_errors", 1);
                let _ = self.ledger.mark_failed(&entry.id, &err.to_string());
                error!(
                    signal_id = %event.signal_id,
                    error = %err,
                    "signal ingest failed, ledger entry retained for replay"
                );
                Err(ApiError::Internal(err))
            }
        }
    }

    /// Replay a signal from its ledger payload (used by the reconciler).
    /// Skips the ledger write — the entry already exists. Returns
    /// `(ack, was_new)`.
    pub fn replay_from_ledger(
        &self,
        tenant_id: &str,
        signal_id: &str,
        payload: &str,
    ) -> Result<(IngestAck, bool), ApiError> {
        if let Some(ack_id) = self
            .signals
            .find_ack(tenant_id, signal_id)
            .map_err(ApiError::Internal)?
        {
            return Ok((
                IngestAck {
                    ack_id,
                    duplicate: true,
                },
                false,
            ));
        }

        let event: SignalEvent = serde_json::from_str(payload).map_err(|e| {
            ApiError::validation("payload", format!("ledger payload does not parse: {e}"))
        })?;

        let ack_id = new_ack_id();
        self.signals
            .insert(tenant_id, &event, &ack_id)
            .map_err(ApiError::Internal)?;
        self.counters.ingested.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("riskcast_ingest_total_ingested", 1);
        info!(signal_id = %signal_id, ack_id = %ack_id, "signal replayed from ledger");

        Ok((
            IngestAck {
                ack_id,
                duplicate: false,
            },
            true,
        ))
    }

    fn fire_alert_hook(&self, tenant_id: &str, event: &SignalEvent) {
        let Some(alerts) = &self.alerts else {
            return;
        };
        let severity = event.signal.confidence_score * 100.0;
        if severity < ALERT_SEVERITY_FLOOR {
            return;
        }
        alerts.dispatch(Alert {
            tenant_id: tenant_id.to_string(),
            source: AlertSource::Ingest,
            subject: event.signal.title.clone(),
            severity_score: severity,
            resource_id: event.signal_id.clone(),
            details: serde_json::json!({
                "category": event.signal.category,
                "probability": event.signal.probability,
            }),
            raised_at: Utc::now(),
        });
    }
}

fn new_ack_id() -> String {
    format!("riskcast-ack-{:08x}", rand::random::<u32>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::SignalPayload;

    fn service(db: &Database) -> IngestService {
        IngestService::new(
            LedgerStore::new(db.clone()),
            SignalStore::new(db.clone()),
            AuditLog::new(db.clone()),
            None,
        )
    }

    fn event(signal_id: &str) -> SignalEvent {
        SignalEvent {
            schema_version: "1.0.0".to_string(),
            signal_id: signal_id.to_string(),
            deterministic_trace_id: None,
            input_event_hash: None,
            source_event_id: None,
            ruleset_version: None,
            observed_at: Some(Utc::now()),
            emitted_at: Some(Utc::now()),
            signal: SignalPayload {
                signal_id: signal_id.to_string(),
                source_event_id: None,
                title: "Container rates spiking on transpacific lanes".to_string(),
                description: None,
                probability: 0.7,
                probability_source: None,
                confidence_score: 0.8,
                confidence_level: None,
                category: "SUPPLY_CHAIN".to_string(),
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

    #[test]
    fn test_ingest_then_duplicate_returns_same_ack() {
        let db = Database::open_in_memory().unwrap();
        let svc = service(&db);
        let e = event("OMEN-A-1");

        let (ack1, dup1) = svc.ingest("t", &e).unwrap();
        assert!(!dup1);
        assert!(ack1.ack_id.starts_with("riskcast-ack-"));

        let (ack2, dup2) = svc.ingest("t", &e).unwrap();
        assert!(dup2);
        assert_eq!(ack1.ack_id, ack2.ack_id);

        let snap = svc.counters().snapshot();
        assert_eq!(snap.total_received, 2);
        assert_eq!(snap.total_ingested, 1);
        assert_eq!(snap.total_duplicates, 1);

        // Exactly one ledger row and one primary row.
        let ledger = LedgerStore::new(db.clone());
        let since = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(ledger.entries_since("t", since).unwrap().len(), 1);
        let store = SignalStore::new(db);
        assert_eq!(store.count_since("t", since).unwrap(), 1);
    }

    #[test]
    fn test_invalid_event_rejected_before_ledger() {
        let db = Database::open_in_memory().unwrap();
        let svc = service(&db);
        let mut e = event("OMEN-A-2");
        e.signal.probability = 2.0;

        assert!(svc.ingest("t", &e).is_err());
        let ledger = LedgerStore::new(db);
        let since = Utc::now() - chrono::Duration::hours(1);
        assert!(ledger.entries_since("t", since).unwrap().is_empty());
    }

    #[test]
    fn test_replay_from_ledger_matches_direct_ingest_identity() {
        let db = Database::open_in_memory().unwrap();
        let svc = service(&db);
        let e = event("OMEN-A-3");
        let payload = serde_json::to_string(&e).unwrap();

        // Ledger-only entry, as if the primary insert had failed.
        let ledger = LedgerStore::new(db.clone());
        ledger.record("t", &e).unwrap();

        let (ack, was_new) = svc.replay_from_ledger("t", "OMEN-A-3", &payload).unwrap();
        assert!(was_new);

        // A later direct ingest observes the replayed row as a duplicate.
        let (ack2, dup) = svc.ingest("t", &e).unwrap();
        assert!(dup);
        assert_eq!(ack.ack_id, ack2.ack_id);
    }

    #[test]
    fn test_replay_of_existing_signal_is_not_new() {
        let db = Database::open_in_memory().unwrap();
        let svc = service(&db);
        let e = event("OMEN-A-4");
        let payload = serde_json::to_string(&e).unwrap();

        let (ack, _) = svc.ingest("t", &e).unwrap();
        let (replay_ack, was_new) = svc.replay_from_ledger("t", "OMEN-A-4", &payload).unwrap();
        assert!(!was_new);
        assert_eq!(ack.ack_id, replay_ack.ack_id);
    }
}
