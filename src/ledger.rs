//! Write-ahead signal ledger.
//!
//! Every signal is recorded here before any primary-store write, so no
//! ingested signal can exist without an earlier-committed ledger entry.
//! Entries are append-only: after insert, only the status/ack/error fields
//! transition, and only forward (`received` → `ingested` | `failed`; a
//! `failed` entry may still become `ingested` via replay, never the reverse).

use crate::db::Database;
use crate::models::{fmt_ts, parse_ts, SignalEvent};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    Received,
    Ingested,
    Failed,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Received => "received",
            LedgerStatus::Ingested => "ingested",
            LedgerStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "ingested" => LedgerStatus::Ingested,
            "failed" => LedgerStatus::Failed,
            _ => LedgerStatus::Received,
        }
    }
}

/// A ledger row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub tenant_id: String,
    pub signal_id: String,
    /// Verbatim event payload, kept for replay.
    pub payload: String,
    pub status: LedgerStatus,
    pub ack_id: Option<String>,
    pub error_message: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub ingested_at: Option<DateTime<Utc>>,
}

/// Repository over `signal_ledger`
#[derive(Clone)]
pub struct LedgerStore {
    db: Database,
}

impl LedgerStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record a received event. The insert runs in its own (auto-committed)
    /// transaction and so is durable before the primary-store insert that
    /// follows it begins.
    pub fn record(&self, tenant_id: &str, event: &SignalEvent) -> Result<LedgerEntry> {
        let id = uuid::Uuid::new_v4().to_string();
        let recorded_at = Utc::now();
        let payload =
            serde_json::to_string(event).context("failed to serialize ledger payload")?;

        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO signal_ledger (id, tenant_id, signal_id, payload, status, recorded_at)
             VALUES (?1, ?2, ?3, ?4, 'received', ?5)",
            params![id, tenant_id, event.signal_id, payload, fmt_ts(recorded_at)],
        )?;
        drop(conn);

        info!(
            signal_id = %event.signal_id,
            ledger_id = %id,
            "ledger entry recorded"
        );

        Ok(LedgerEntry {
            id,
            tenant_id: tenant_id.to_string(),
            signal_id: event.signal_id.clone(),
            payload,
            status: LedgerStatus::Received,
            ack_id: None,
            error_message: None,
            recorded_at,
            ingested_at: None,
        })
    }

    /// Forward transition to `ingested`. Idempotent for entries already
    /// ingested with the same ack.
    pub fn mark_ingested(&self, entry_id: &str, ack_id: &str) -> Result<()> {
        let conn = self.db.lock();
        let updated = conn.execute(
            "UPDATE signal_ledger
             SET status = 'ingested', ack_id = ?2, ingested_at = ?3, error_message = NULL
             WHERE id = ?1 AND status IN ('received', 'failed')",
            params![entry_id, ack_id, fmt_ts(Utc::now())],
        )?;
        if updated == 0 {
            let current: Option<String> = conn
                .query_row(
                    "SELECT status FROM signal_ledger WHERE id = ?1",
                    params![entry_id],
                    |row| row.get(0),
                )
                .optional()?;
            match current.as_deref() {
                Some("ingested") => {} // already terminal-success
                Some(other) => bail!("ledger entry {entry_id} in unexpected status {other}"),
                None => bail!("ledger entry {entry_id} not found"),
            }
        }
        Ok(())
    }

    /// Forward transition to `failed`. An `ingested` entry stays ingested.
    pub fn mark_failed(&self, entry_id: &str, error: &str) -> Result<()> {
        let truncated: String = error.chars().take(2000).collect();
        let conn = self.db.lock();
        conn.execute(
            "UPDATE signal_ledger
             SET status = 'failed', error_message = ?2
             WHERE id = ?1 AND status = 'received'",
            params![entry_id, truncated],
        )?;
        Ok(())
    }

    /// All entries recorded since a threshold, oldest first.
    pub fn entries_since(
        &self,
        tenant_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, signal_id, payload, status, ack_id, error_message,
                    recorded_at, ingested_at
             FROM signal_ledger
             WHERE tenant_id = ?1 AND recorded_at >= ?2
             ORDER BY recorded_at ASC",
        )?;
        let entries = stmt
            .query_map(params![tenant_id, fmt_ts(since)], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn signal_ids_since(
        &self,
        tenant_id: &str,
        since: DateTime<Utc>,
    ) -> Result<HashSet<String>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT signal_id FROM signal_ledger WHERE tenant_id = ?1 AND recorded_at >= ?2",
        )?;
        let ids = stmt
            .query_map(params![tenant_id, fmt_ts(since)], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(ids)
    }

    /// Latest entry for a signal id, for tracing and replay bookkeeping.
    pub fn latest_for_signal(
        &self,
        tenant_id: &str,
        signal_id: &str,
    ) -> Result<Option<LedgerEntry>> {
        let conn = self.db.lock();
        let entry = conn
            .query_row(
                "SELECT id, tenant_id, signal_id, payload, status, ack_id, error_message,
                        recorded_at, ingested_at
                 FROM signal_ledger
                 WHERE tenant_id = ?1 AND signal_id = ?2
                 ORDER BY recorded_at DESC LIMIT 1",
                params![tenant_id, signal_id],
                Self::map_row,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn failed_count_since(&self, tenant_id: &str, since: DateTime<Utc>) -> Result<i64> {
        let conn = self.db.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM signal_ledger
             WHERE tenant_id = ?1 AND recorded_at >= ?2 AND status = 'failed'",
            params![tenant_id, fmt_ts(since)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Total ledger rows, exported as a depth gauge.
    pub fn depth(&self) -> Result<i64> {
        let conn = self.db.lock();
        let count = conn.query_row("SELECT COUNT(*) FROM signal_ledger", [], |row| row.get(0))?;
        Ok(count)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerEntry> {
        let status_raw: String = row.get(4)?;
        Ok(LedgerEntry {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            signal_id: row.get(2)?,
            payload: row.get(3)?,
            status: LedgerStatus::parse(&status_raw),
            ack_id: row.get(5)?,
            error_message: row.get(6)?,
            recorded_at: parse_ts(&row.get::<_, String>(7)?).unwrap_or_else(Utc::now),
            ingested_at: row
                .get::<_, Option<String>>(8)?
                .as_deref()
                .and_then(parse_ts),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalPayload;

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
                title: "Strike announced at transshipment hub".to_string(),
                description: None,
                probability: 0.55,
                probability_source: None,
                confidence_score: 0.7,
                confidence_level: None,
                category: "LABOR".to_string(),
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

    fn store() -> LedgerStore {
        LedgerStore::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn test_record_then_mark_ingested() {
        let ledger = store();
        let entry = ledger.record("t", &event("OMEN-1")).unwrap();
        assert_eq!(entry.status, LedgerStatus::Received);

        ledger.mark_ingested(&entry.id, "riskcast-ack-12345678").unwrap();
        let stored = ledger.latest_for_signal("t", "OMEN-1").unwrap().unwrap();
        assert_eq!(stored.status, LedgerStatus::Ingested);
        assert_eq!(stored.ack_id.as_deref(), Some("riskcast-ack-12345678"));
        assert!(stored.ingested_at.is_some());
    }

    #[test]
    fn test_ingested_cannot_become_failed() {
        let ledger = store();
        let entry = ledger.record("t", &event("OMEN-2")).unwrap();
        ledger.mark_ingested(&entry.id, "riskcast-ack-1").unwrap();
        ledger.mark_failed(&entry.id, "late failure").unwrap();

        let stored = ledger.latest_for_signal("t", "OMEN-2").unwrap().unwrap();
        assert_eq!(stored.status, LedgerStatus::Ingested);
    }

    #[test]
    fn test_failed_can_be_replayed_to_ingested() {
        let ledger = store();
        let entry = ledger.record("t", &event("OMEN-3")).unwrap();
        ledger.mark_failed(&entry.id, "db write refused").unwrap();
        ledger.mark_ingested(&entry.id, "riskcast-ack-2").unwrap();

        let stored = ledger.latest_for_signal("t", "OMEN-3").unwrap().unwrap();
        assert_eq!(stored.status, LedgerStatus::Ingested);
        assert!(stored.error_message.is_none());
    }

    #[test]
    fn test_entries_since_is_tenant_scoped() {
        let ledger = store();
        ledger.record("tenant-a", &event("OMEN-A")).unwrap();
        ledger.record("tenant-b", &event("OMEN-B")).unwrap();

        let since = Utc::now() - chrono::Duration::hours(1);
        let a = ledger.entries_since("tenant-a", since).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].signal_id, "OMEN-A");

        let ids = ledger.signal_ids_since("tenant-b", since).unwrap();
        assert!(ids.contains("OMEN-B") && !ids.contains("OMEN-A"));
    }
}
