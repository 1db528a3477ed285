//! Tamper-evident audit trail.
//!
//! Append-only, SHA-256 hash-chained. Each entry's hash covers the canonical
//! string `entry_id|ts|action|tenant|actor|status|previous_hash` and stores
//! the previous entry's hash, so any in-place edit or re-ordering breaks the
//! chain. The chain is global across tenants; listing is tenant-filtered.
//!
//! Logging must never break the calling flow: use [`AuditLog::record_best_effort`]
//! on business paths.

use crate::db::Database;
use crate::errors::ApiError;
use crate::models::{fmt_ts, parse_ts};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

const MAX_REPORTED_BREAKS: usize = 10;

fn compute_entry_hash(
    entry_id: &str,
    ts: &str,
    action: &str,
    tenant_id: &str,
    actor: &str,
    status: &str,
    previous_hash: &str,
) -> String {
    let payload = format!("{entry_id}|{ts}|{action}|{tenant_id}|{actor}|{status}|{previous_hash}");
    hex::encode(Sha256::digest(payload.as_bytes()))
}

/// A security-relevant event to be appended to the trail
#[derive(Debug, Clone, Default)]
pub struct AuditEvent {
    pub action: String,
    pub status: String,
    pub tenant_id: Option<String>,
    pub actor: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub details: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            status: "success".to_string(),
            ..Default::default()
        }
    }

    pub fn denied(mut self) -> Self {
        self.status = "denied".to_string();
        self
    }

    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn resource(mut self, rtype: impl Into<String>, rid: impl Into<String>) -> Self {
        self.resource_type = Some(rtype.into());
        self.resource_id = Some(rid.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// A stored audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: String,
    pub timestamp: String,
    pub tenant_id: Option<String>,
    pub actor: Option<String>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub status: String,
    pub details: Option<serde_json::Value>,
    pub previous_hash: Option<String>,
    pub entry_hash: String,
}

/// A detected break in the hash chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainBreak {
    pub entry_id: String,
    pub timestamp: String,
    pub issue: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

/// Result of a chain verification pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainVerification {
    pub chain_intact: bool,
    pub total_entries: usize,
    pub breaks_found: usize,
    pub breaks: Vec<ChainBreak>,
}

/// Append-only hash-chained audit log
#[derive(Clone)]
pub struct AuditLog {
    db: Database,
}

impl AuditLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append an event. The database lock spans the chain-head read and the
    /// insert, so concurrent writers cannot both chain off the same
    /// predecessor.
    pub fn record(&self, event: AuditEvent) -> Result<AuditEntry, ApiError> {
        for (field, value) in [
            ("action", Some(event.action.as_str())),
            ("status", Some(event.status.as_str())),
            ("tenant", event.tenant_id.as_deref()),
            ("actor", event.actor.as_deref()),
        ] {
            if value.is_some_and(|v| v.contains('|')) {
                return Err(ApiError::validation(
                    field,
                    "audit fields may not contain the '|' separator",
                ));
            }
        }

        let entry_id = uuid::Uuid::new_v4().to_string();
        let ts = fmt_ts(Utc::now());

        let conn = self.db.lock();
        let previous_hash: Option<String> = conn
            .query_row(
                "SELECT entry_hash FROM audit_log ORDER BY ts DESC, rowid DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| ApiError::Internal(e.into()))?;

        let entry_hash = compute_entry_hash(
            &entry_id,
            &ts,
            &event.action,
            event.tenant_id.as_deref().unwrap_or(""),
            event.actor.as_deref().unwrap_or(""),
            &event.status,
            previous_hash.as_deref().unwrap_or(""),
        );

        conn.execute(
            "INSERT INTO audit_log (
                entry_id, ts, tenant_id, actor, action, resource_type, resource_id,
                status, details, previous_hash, entry_hash
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                entry_id,
                ts,
                event.tenant_id,
                event.actor,
                event.action,
                event.resource_type,
                event.resource_id,
                event.status,
                event
                    .details
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()
                    .map_err(|e| ApiError::Internal(e.into()))?,
                previous_hash,
                entry_hash,
            ],
        )
        .map_err(|e| ApiError::Internal(e.into()))?;

        Ok(AuditEntry {
            entry_id,
            timestamp: ts,
            tenant_id: event.tenant_id,
            actor: event.actor,
            action: event.action,
            resource_type: event.resource_type,
            resource_id: event.resource_id,
            status: event.status,
            details: event.details,
            previous_hash,
            entry_hash,
        })
    }

    /// Append an event without propagating failures. A failed audit write is
    /// itself surfaced out-of-band and the caller proceeds.
    pub fn record_best_effort(&self, event: AuditEvent) {
        let action = event.action.clone();
        if let Err(err) = self.record(event) {
            metrics::counter!("riskcast_audit_write_failures", 1);
            warn!(action = %action, error = %err, "audit write failed, continuing");
        }
    }

    /// Stream the chain in timestamp order and verify both the hash linkage
    /// and each entry's own recomputed hash. The first
    /// 10 breaks are reported with enough context to investigate.
    pub fn verify_chain(&self) -> Result<ChainVerification> {
        let entries = self.all_entries_chain_order()?;
        let total = entries.len();
        let mut breaks: Vec<ChainBreak> = Vec::new();
        let mut previous_hash: Option<String> = None;

        for entry in &entries {
            if entry.previous_hash != previous_hash {
                breaks.push(ChainBreak {
                    entry_id: entry.entry_id.clone(),
                    timestamp: entry.timestamp.clone(),
                    issue: "previous_hash_mismatch".to_string(),
                    expected: previous_hash.clone(),
                    actual: entry.previous_hash.clone(),
                });
            }

            let expected = compute_entry_hash(
                &entry.entry_id,
                &entry.timestamp,
                &entry.action,
                entry.tenant_id.as_deref().unwrap_or(""),
                entry.actor.as_deref().unwrap_or(""),
                &entry.status,
                entry.previous_hash.as_deref().unwrap_or(""),
            );
            if entry.entry_hash != expected {
                breaks.push(ChainBreak {
                    entry_id: entry.entry_id.clone(),
                    timestamp: entry.timestamp.clone(),
                    issue: "entry_hash_mismatch".to_string(),
                    expected: Some(expected),
                    actual: Some(entry.entry_hash.clone()),
                });
            }

            previous_hash = Some(entry.entry_hash.clone());
        }

        let breaks_found = breaks.len();
        breaks.truncate(MAX_REPORTED_BREAKS);

        if breaks_found > 0 {
            warn!(breaks = breaks_found, "audit chain verification found breaks");
        } else {
            info!(total_entries = total, "audit chain verified");
        }

        Ok(ChainVerification {
            chain_intact: breaks_found == 0,
            total_entries: total,
            breaks_found,
            breaks,
        })
    }

    /// Paginated, tenant-scoped listing, newest first.
    pub fn list(
        &self,
        tenant_id: &str,
        action: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<AuditEntry>, usize)> {
        let conn = self.db.lock();
        let total: usize = conn.query_row(
            "SELECT COUNT(*) FROM audit_log WHERE tenant_id = ?1
               AND (?2 IS NULL OR action = ?2)",
            params![tenant_id, action],
            |row| row.get::<_, i64>(0).map(|n| n as usize),
        )?;

        let mut stmt = conn.prepare(
            "SELECT entry_id, ts, tenant_id, actor, action, resource_type, resource_id,
                    status, details, previous_hash, entry_hash
             FROM audit_log
             WHERE tenant_id = ?1 AND (?2 IS NULL OR action = ?2)
             ORDER BY ts DESC, rowid DESC LIMIT ?3 OFFSET ?4",
        )?;
        let entries = stmt
            .query_map(
                params![tenant_id, action, limit as i64, offset as i64],
                Self::map_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((entries, total))
    }

    fn all_entries_chain_order(&self) -> Result<Vec<AuditEntry>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT entry_id, ts, tenant_id, actor, action, resource_type, resource_id,
                    status, details, previous_hash, entry_hash
             FROM audit_log ORDER BY ts ASC, rowid ASC",
        )?;
        let entries = stmt
            .query_map([], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEntry> {
        let details_raw: Option<String> = row.get(8)?;
        Ok(AuditEntry {
            entry_id: row.get(0)?,
            timestamp: row.get(1)?,
            tenant_id: row.get(2)?,
            actor: row.get(3)?,
            action: row.get(4)?,
            resource_type: row.get(5)?,
            resource_id: row.get(6)?,
            status: row.get(7)?,
            details: details_raw.and_then(|raw| serde_json::from_str(&raw).ok()),
            previous_hash: row.get(9)?,
            entry_hash: row.get(10)?,
        })
    }
}

// Keep parse_ts referenced for chain consumers that need typed timestamps.
pub fn entry_timestamp(entry: &AuditEntry) -> Option<DateTime<Utc>> {
    parse_ts(&entry.timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audit() -> AuditLog {
        AuditLog::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn test_chain_intact_after_sequential_logs() {
        let log = audit();
        for i in 0..5 {
            log.record(
                AuditEvent::new("signal_ingested")
                    .tenant("tenant-a")
                    .actor("apikey:omen")
                    .resource("signal", format!("OMEN-{i}")),
            )
            .unwrap();
        }
        let report = log.verify_chain().unwrap();
        assert!(report.chain_intact);
        assert_eq!(report.total_entries, 5);
        assert!(report.breaks.is_empty());
    }

    #[test]
    fn test_tampered_action_breaks_chain_at_that_entry() {
        let db = Database::open_in_memory().unwrap();
        let log = AuditLog::new(db.clone());
        let mut ids = Vec::new();
        for i in 0..5 {
            let entry = log
                .record(AuditEvent::new(format!("action_{i}")).tenant("t"))
                .unwrap();
            ids.push(entry.entry_id);
        }

        // Tamper with entry #3 directly in storage.
        db.lock()
            .execute(
                "UPDATE audit_log SET action = 'forged' WHERE entry_id = ?1",
                params![ids[2]],
            )
            .unwrap();

        let report = log.verify_chain().unwrap();
        assert!(!report.chain_intact);
        assert_eq!(report.breaks_found, 1);
        assert_eq!(report.breaks[0].entry_id, ids[2]);
        assert_eq!(report.breaks[0].issue, "entry_hash_mismatch");
    }

    #[test]
    fn test_separator_in_field_rejected() {
        let log = audit();
        let err = log.record(AuditEvent::new("bad|action")).unwrap_err();
        assert!(err.to_string().contains("separator"));
    }

    #[test]
    fn test_listing_is_tenant_scoped() {
        let log = audit();
        log.record(AuditEvent::new("login").tenant("tenant-a")).unwrap();
        log.record(AuditEvent::new("login").tenant("tenant-b")).unwrap();

        let (entries, total) = log.list("tenant-a", None, 0, 50).unwrap();
        assert_eq!(total, 1);
        assert!(entries.iter().all(|e| e.tenant_id.as_deref() == Some("tenant-a")));
    }
}
