//! SQLite persistence layer.
//!
//! One connection behind a `parking_lot::Mutex`; every repository holds a
//! clone of [`Database`] and takes the lock only for the duration of its
//! critical section. WAL mode keeps readers unblocked during writes.
//!
//! Every tenant-scoped table carries a `tenant_id` column and every query
//! against it includes the tenant predicate. A missing tenant predicate is
//! a review-blocking defect.

use crate::models::{fmt_ts, parse_ts, InternalSignal, SignalEvent};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

-- Write-ahead ledger: every signal is recorded here before the primary store.
CREATE TABLE IF NOT EXISTS signal_ledger (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    signal_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'received',
    ack_id TEXT,
    error_message TEXT,
    recorded_at TEXT NOT NULL,
    ingested_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_ledger_recorded ON signal_ledger(tenant_id, recorded_at);
CREATE INDEX IF NOT EXISTS idx_ledger_signal ON signal_ledger(tenant_id, signal_id);

-- Primary store for ingested signals; signal_id is the idempotency key.
CREATE TABLE IF NOT EXISTS ingest_signals (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    signal_id TEXT NOT NULL,
    ack_id TEXT NOT NULL,
    schema_version TEXT NOT NULL DEFAULT '1.0.0',
    deterministic_trace_id TEXT,
    input_event_hash TEXT,
    source_event_id TEXT,
    ruleset_version TEXT,
    observed_at TEXT,
    emitted_at TEXT,
    title TEXT NOT NULL,
    description TEXT,
    probability REAL NOT NULL,
    confidence_score REAL NOT NULL,
    confidence_level TEXT,
    category TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    geographic TEXT,
    temporal TEXT,
    evidence TEXT NOT NULL DEFAULT '[]',
    raw_payload TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    processed INTEGER NOT NULL DEFAULT 0,
    ingested_at TEXT NOT NULL,
    UNIQUE(tenant_id, signal_id)
);
CREATE INDEX IF NOT EXISTS idx_ingest_ingested_at ON ingest_signals(tenant_id, ingested_at);
CREATE INDEX IF NOT EXISTS idx_ingest_category ON ingest_signals(tenant_id, category);

-- Normalized per-entity signals consumed by the risk engine.
CREATE TABLE IF NOT EXISTS internal_signals (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    source TEXT NOT NULL,
    signal_type TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    confidence REAL NOT NULL,
    severity_score REAL NOT NULL,
    evidence TEXT NOT NULL DEFAULT '{}',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    UNIQUE(tenant_id, source, signal_type, entity_type, entity_id)
);
CREATE INDEX IF NOT EXISTS idx_internal_entity
    ON internal_signals(tenant_id, entity_type, entity_id);

-- Orders carry the exposure the decision engine uses for order entities.
CREATE TABLE IF NOT EXISTS orders (
    tenant_id TEXT NOT NULL,
    order_id TEXT NOT NULL,
    total_value REAL NOT NULL,
    delivery_days REAL NOT NULL DEFAULT 14,
    created_at TEXT NOT NULL,
    PRIMARY KEY (tenant_id, order_id)
);

-- Immutable outcome records, one per decision.
CREATE TABLE IF NOT EXISTS outcomes (
    id TEXT PRIMARY KEY,
    decision_id TEXT NOT NULL UNIQUE,
    tenant_id TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    predicted_risk_score REAL NOT NULL,
    predicted_confidence REAL NOT NULL,
    predicted_loss_usd REAL NOT NULL DEFAULT 0,
    predicted_action TEXT NOT NULL,
    outcome_type TEXT NOT NULL,
    actual_loss_usd REAL NOT NULL DEFAULT 0,
    actual_delay_days REAL NOT NULL DEFAULT 0,
    action_taken TEXT NOT NULL DEFAULT '',
    action_followed_recommendation INTEGER NOT NULL DEFAULT 0,
    action_cost_usd REAL NOT NULL DEFAULT 0,
    risk_materialized INTEGER NOT NULL DEFAULT 0,
    prediction_error REAL NOT NULL DEFAULT 0,
    was_accurate INTEGER NOT NULL DEFAULT 0,
    value_generated_usd REAL NOT NULL DEFAULT 0,
    recorded_at TEXT NOT NULL,
    recorded_by TEXT,
    notes TEXT
);
CREATE INDEX IF NOT EXISTS idx_outcomes_tenant ON outcomes(tenant_id, recorded_at);
CREATE INDEX IF NOT EXISTS idx_outcomes_entity ON outcomes(tenant_id, entity_type, entity_id);

-- Append-only audit log; the hash chain is global across tenants so entries
-- cannot be silently re-ordered.
CREATE TABLE IF NOT EXISTS audit_log (
    entry_id TEXT PRIMARY KEY,
    ts TEXT NOT NULL,
    tenant_id TEXT,
    actor TEXT,
    action TEXT NOT NULL,
    resource_type TEXT,
    resource_id TEXT,
    status TEXT NOT NULL DEFAULT 'success',
    details TEXT,
    previous_hash TEXT,
    entry_hash TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_ts ON audit_log(ts);
CREATE INDEX IF NOT EXISTS idx_audit_tenant ON audit_log(tenant_id, ts);

-- Reconciliation run log.
CREATE TABLE IF NOT EXISTS reconcile_log (
    id TEXT PRIMARY KEY,
    reconcile_id TEXT NOT NULL UNIQUE,
    tenant_id TEXT NOT NULL,
    target_date TEXT NOT NULL,
    total_in_ledger INTEGER NOT NULL DEFAULT 0,
    total_in_db INTEGER NOT NULL DEFAULT 0,
    missing_count INTEGER NOT NULL DEFAULT 0,
    replayed_count INTEGER NOT NULL DEFAULT 0,
    failed_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'running',
    error_message TEXT,
    started_at TEXT NOT NULL,
    completed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_reconcile_date ON reconcile_log(tenant_id, target_date);

-- Active Bayesian priors per (tenant, entity_type), written by the flywheel.
CREATE TABLE IF NOT EXISTS flywheel_priors (
    tenant_id TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    alpha REAL NOT NULL,
    beta REAL NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (tenant_id, entity_type)
);
"#;

/// Shared database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        info!(path, "database opened");
        Ok(db)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(SCHEMA_SQL)
            .context("failed to initialize schema")?;
        Ok(())
    }

    /// Take the connection lock. Keep critical sections short.
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}

// ── Primary signal store ─────────────────────────────────────────────────

/// A row in the primary ingest store
#[derive(Debug, Clone)]
pub struct IngestedSignal {
    pub id: String,
    pub tenant_id: String,
    pub signal_id: String,
    pub ack_id: String,
    pub category: String,
    pub title: String,
    pub probability: f64,
    pub confidence_score: f64,
    pub observed_at: Option<DateTime<Utc>>,
    pub emitted_at: Option<DateTime<Utc>>,
    pub ingested_at: DateTime<Utc>,
    pub is_active: bool,
    pub processed: bool,
}

/// Repository over `ingest_signals`
#[derive(Clone)]
pub struct SignalStore {
    db: Database,
}

impl SignalStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Idempotency probe: the stored ack for a signal_id, if any.
    pub fn find_ack(&self, tenant_id: &str, signal_id: &str) -> Result<Option<String>> {
        let conn = self.db.lock();
        let ack = conn
            .query_row(
                "SELECT ack_id FROM ingest_signals WHERE tenant_id = ?1 AND signal_id = ?2",
                params![tenant_id, signal_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(ack)
    }

    pub fn find_by_signal_id(
        &self,
        tenant_id: &str,
        signal_id: &str,
    ) -> Result<Option<IngestedSignal>> {
        let conn = self.db.lock();
        let row = conn
            .query_row(
                "SELECT id, tenant_id, signal_id, ack_id, category, title, probability,
                        confidence_score, observed_at, emitted_at, ingested_at, is_active, processed
                 FROM ingest_signals WHERE tenant_id = ?1 AND signal_id = ?2",
                params![tenant_id, signal_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Insert a normalized row built from the verbatim event. Fails on
    /// duplicate (tenant, signal_id) — callers probe first.
    pub fn insert(&self, tenant_id: &str, event: &SignalEvent, ack_id: &str) -> Result<()> {
        let sig = &event.signal;
        let raw_payload = serde_json::to_string(event)?;
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO ingest_signals (
                id, tenant_id, signal_id, ack_id, schema_version, deterministic_trace_id,
                input_event_hash, source_event_id, ruleset_version, observed_at, emitted_at,
                title, description, probability, confidence_score, confidence_level,
                category, tags, geographic, temporal, evidence, raw_payload, ingested_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                       ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
            params![
                uuid::Uuid::new_v4().to_string(),
                tenant_id,
                event.signal_id,
                ack_id,
                event.schema_version,
                event.deterministic_trace_id,
                event.input_event_hash,
                event.source_event_id,
                event
                    .ruleset_version
                    .clone()
                    .or_else(|| sig.ruleset_version.clone()),
                event.observed_at.map(fmt_ts),
                event.emitted_at.map(fmt_ts),
                sig.title,
                sig.description,
                sig.probability,
                sig.confidence_score,
                sig.confidence_level,
                sig.category,
                serde_json::to_string(&sig.tags)?,
                sig.geographic
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                sig.temporal
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                serde_json::to_string(&sig.evidence)?,
                raw_payload,
                fmt_ts(Utc::now()),
            ],
        )?;
        Ok(())
    }

    pub fn signal_ids_since(
        &self,
        tenant_id: &str,
        since: DateTime<Utc>,
    ) -> Result<HashSet<String>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT signal_id FROM ingest_signals WHERE tenant_id = ?1 AND ingested_at >= ?2",
        )?;
        let ids = stmt
            .query_map(params![tenant_id, fmt_ts(since)], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(ids)
    }

    pub fn count_since(&self, tenant_id: &str, since: DateTime<Utc>) -> Result<i64> {
        let conn = self.db.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM ingest_signals WHERE tenant_id = ?1 AND ingested_at >= ?2",
            params![tenant_id, fmt_ts(since)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn last_ingested_at(&self, tenant_id: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.db.lock();
        let raw = conn
            .query_row(
                "SELECT MAX(ingested_at) FROM ingest_signals WHERE tenant_id = ?1",
                params![tenant_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten();
        Ok(raw.as_deref().and_then(parse_ts))
    }

    /// Ingested-at timestamps in ascending order, for gap detection.
    pub fn ingested_times_since(
        &self,
        tenant_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT ingested_at FROM ingest_signals
             WHERE tenant_id = ?1 AND ingested_at >= ?2 ORDER BY ingested_at ASC",
        )?;
        let times = stmt
            .query_map(params![tenant_id, fmt_ts(since)], |row| {
                row.get::<_, String>(0)
            })?
            .filter_map(|r| r.ok())
            .filter_map(|raw| parse_ts(&raw))
            .collect();
        Ok(times)
    }

    /// (emitted_at, ingested_at) pairs where both are present, for lag stats.
    pub fn lag_pairs_since(
        &self,
        tenant_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT emitted_at, ingested_at FROM ingest_signals
             WHERE tenant_id = ?1 AND ingested_at >= ?2 AND emitted_at IS NOT NULL",
        )?;
        let pairs = stmt
            .query_map(params![tenant_id, fmt_ts(since)], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(e, i)| Some((parse_ts(&e)?, parse_ts(&i)?)))
            .collect();
        Ok(pairs)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<IngestedSignal> {
        Ok(IngestedSignal {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            signal_id: row.get(2)?,
            ack_id: row.get(3)?,
            category: row.get(4)?,
            title: row.get(5)?,
            probability: row.get(6)?,
            confidence_score: row.get(7)?,
            observed_at: row
                .get::<_, Option<String>>(8)?
                .as_deref()
                .and_then(parse_ts),
            emitted_at: row
                .get::<_, Option<String>>(9)?
                .as_deref()
                .and_then(parse_ts),
            ingested_at: parse_ts(&row.get::<_, String>(10)?).unwrap_or_else(Utc::now),
            is_active: row.get(11)?,
            processed: row.get(12)?,
        })
    }
}

// ── Internal signal store ────────────────────────────────────────────────

/// Repository over `internal_signals`
#[derive(Clone)]
pub struct InternalSignalStore {
    db: Database,
}

impl InternalSignalStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or refresh the row for the unique composite key.
    pub fn upsert(&self, signal: &InternalSignal) -> Result<()> {
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO internal_signals (
                id, tenant_id, source, signal_type, entity_type, entity_id,
                confidence, severity_score, evidence, is_active, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(tenant_id, source, signal_type, entity_type, entity_id)
             DO UPDATE SET confidence = excluded.confidence,
                           severity_score = excluded.severity_score,
                           evidence = excluded.evidence,
                           is_active = excluded.is_active,
                           created_at = excluded.created_at",
            params![
                signal.id,
                signal.tenant_id,
                signal.source,
                signal.signal_type,
                signal.entity_type,
                signal.entity_id,
                signal.confidence,
                signal.severity_score,
                serde_json::to_string(&signal.evidence)?,
                signal.is_active,
                fmt_ts(signal.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn active_for_entity(
        &self,
        tenant_id: &str,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<InternalSignal>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, source, signal_type, entity_type, entity_id,
                    confidence, severity_score, evidence, is_active, created_at
             FROM internal_signals
             WHERE tenant_id = ?1 AND entity_type = ?2 AND entity_id = ?3 AND is_active = 1",
        )?;
        let signals = stmt
            .query_map(params![tenant_id, entity_type, entity_id], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(signals)
    }

    /// Distinct at-risk entity ids ordered by their max severity, descending.
    pub fn entities_above_severity(
        &self,
        tenant_id: &str,
        entity_type: &str,
        min_severity: f64,
        limit: usize,
    ) -> Result<Vec<String>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT entity_id FROM internal_signals
             WHERE tenant_id = ?1 AND entity_type = ?2 AND is_active = 1
               AND severity_score >= ?3
             GROUP BY entity_id
             ORDER BY MAX(severity_score) DESC
             LIMIT ?4",
        )?;
        let ids = stmt
            .query_map(
                params![tenant_id, entity_type, min_severity, limit as i64],
                |row| row.get::<_, String>(0),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    pub fn avg_severity(
        &self,
        tenant_id: &str,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Option<f64>> {
        let conn = self.db.lock();
        let avg = conn.query_row(
            "SELECT AVG(severity_score) FROM internal_signals
             WHERE tenant_id = ?1 AND entity_type = ?2 AND entity_id = ?3",
            params![tenant_id, entity_type, entity_id],
            |row| row.get::<_, Option<f64>>(0),
        )?;
        Ok(avg)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<InternalSignal> {
        let evidence_raw: String = row.get(8)?;
        Ok(InternalSignal {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            source: row.get(2)?,
            signal_type: row.get(3)?,
            entity_type: row.get(4)?,
            entity_id: row.get(5)?,
            confidence: row.get(6)?,
            severity_score: row.get(7)?,
            evidence: serde_json::from_str(&evidence_raw)
                .unwrap_or(serde_json::Value::Null),
            is_active: row.get(9)?,
            created_at: parse_ts(&row.get::<_, String>(10)?).unwrap_or_else(Utc::now),
        })
    }
}

// ── Orders (exposure lookup) ─────────────────────────────────────────────

#[derive(Clone)]
pub struct OrderStore {
    db: Database,
}

impl OrderStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn upsert(
        &self,
        tenant_id: &str,
        order_id: &str,
        total_value: f64,
        delivery_days: f64,
    ) -> Result<()> {
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO orders (tenant_id, order_id, total_value, delivery_days, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(tenant_id, order_id)
             DO UPDATE SET total_value = excluded.total_value,
                           delivery_days = excluded.delivery_days",
            params![tenant_id, order_id, total_value, delivery_days, fmt_ts(Utc::now())],
        )?;
        Ok(())
    }

    /// (total_value, delivery_days) for an order, if known.
    pub fn order_value(&self, tenant_id: &str, order_id: &str) -> Result<Option<(f64, f64)>> {
        let conn = self.db.lock();
        let row = conn
            .query_row(
                "SELECT total_value, delivery_days FROM orders
                 WHERE tenant_id = ?1 AND order_id = ?2",
                params![tenant_id, order_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalPayload;

    fn sample_event(signal_id: &str) -> SignalEvent {
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
                title: "Typhoon approaching the Taiwan Strait".to_string(),
                description: None,
                probability: 0.7,
                probability_source: None,
                confidence_score: 0.8,
                confidence_level: Some("HIGH".to_string()),
                category: "WEATHER".to_string(),
                tags: vec!["typhoon".to_string()],
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
    fn test_insert_and_probe_is_tenant_scoped() {
        let db = Database::open_in_memory().unwrap();
        let store = SignalStore::new(db);

        store
            .insert("tenant-a", &sample_event("OMEN-1"), "riskcast-ack-aaaa1111")
            .unwrap();

        assert_eq!(
            store.find_ack("tenant-a", "OMEN-1").unwrap().as_deref(),
            Some("riskcast-ack-aaaa1111")
        );
        // Same signal id, different tenant: invisible.
        assert!(store.find_ack("tenant-b", "OMEN-1").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let db = Database::open_in_memory().unwrap();
        let store = SignalStore::new(db);
        let event = sample_event("OMEN-2");
        store.insert("t", &event, "riskcast-ack-1").unwrap();
        assert!(store.insert("t", &event, "riskcast-ack-2").is_err());
    }

    #[test]
    fn test_internal_signal_upsert_replaces_on_composite_key() {
        let db = Database::open_in_memory().unwrap();
        let store = InternalSignalStore::new(db);
        let mut sig = InternalSignal {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: "t".to_string(),
            source: "analyzer".to_string(),
            signal_type: "payment_risk".to_string(),
            entity_type: "order".to_string(),
            entity_id: "ORD-1".to_string(),
            confidence: 0.8,
            severity_score: 60.0,
            evidence: serde_json::json!({}),
            is_active: true,
            created_at: Utc::now(),
        };
        store.upsert(&sig).unwrap();
        sig.severity_score = 75.0;
        store.upsert(&sig).unwrap();

        let rows = store.active_for_entity("t", "order", "ORD-1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].severity_score, 75.0);
    }

    #[test]
    fn test_entities_ordered_by_max_severity() {
        let db = Database::open_in_memory().unwrap();
        let store = InternalSignalStore::new(db);
        for (entity, sev) in [("ORD-LOW", 35.0), ("ORD-HIGH", 90.0), ("ORD-MID", 55.0)] {
            store
                .upsert(&InternalSignal {
                    id: uuid::Uuid::new_v4().to_string(),
                    tenant_id: "t".to_string(),
                    source: "analyzer".to_string(),
                    signal_type: "route_disruption".to_string(),
                    entity_type: "order".to_string(),
                    entity_id: entity.to_string(),
                    confidence: 0.7,
                    severity_score: sev,
                    evidence: serde_json::json!({}),
                    is_active: true,
                    created_at: Utc::now(),
                })
                .unwrap();
        }
        let ids = store
            .entities_above_severity("t", "order", 30.0, 10)
            .unwrap();
        assert_eq!(ids, vec!["ORD-HIGH", "ORD-MID", "ORD-LOW"]);
    }
}
