//! Shared fixtures for integration tests.

#![allow(dead_code)]

use chrono::{Duration, Utc};
use riskcast_backend::db::Database;
use riskcast_backend::models::{InternalSignal, SignalEvent, SignalPayload};
use riskcast_backend::registry::Services;

pub fn services() -> Services {
    Services::init_for_tests().expect("registry init")
}

pub fn signal_event(signal_id: &str, probability: f64, confidence: f64, category: &str) -> SignalEvent {
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
            title: "Congestion building at a major transshipment hub".to_string(),
            description: Some("Queue lengths doubled over the weekend.".to_string()),
            probability,
            probability_source: None,
            confidence_score: confidence,
            confidence_level: None,
            category: category.to_string(),
            tags: vec!["congestion".to_string()],
            geographic: None,
            temporal: None,
            evidence: vec![],
            trace_id: None,
            ruleset_version: None,
            generated_at: Utc::now(),
        },
    }
}

pub fn seed_internal_signal(
    db: &Database,
    tenant_id: &str,
    entity_type: &str,
    entity_id: &str,
    signal_type: &str,
    severity: f64,
    confidence: f64,
    age_hours: i64,
) {
    riskcast_backend::db::InternalSignalStore::new(db.clone())
        .upsert(&InternalSignal {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            source: "analyzer".to_string(),
            signal_type: signal_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            confidence,
            severity_score: severity,
            evidence: serde_json::json!({}),
            is_active: true,
            created_at: Utc::now() - Duration::hours(age_hours),
        })
        .expect("seed internal signal");
}
