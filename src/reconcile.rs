//! Reconciliation: the safety net for the ingest pipeline.
//!
//! A run diffs the ledger against the primary store over a window and
//! replays anything the primary store is missing. Runs are idempotent, and
//! at most one run executes per tenant at a time.

use crate::audit::{AuditEvent, AuditLog};
use crate::db::{Database, SignalStore};
use crate::errors::ApiError;
use crate::ingest::IngestService;
use crate::ledger::LedgerStore;
use crate::models::{fmt_ts, parse_ts};
use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileStatus {
    Running,
    Completed,
    Partial,
    Failed,
}

impl ReconcileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileStatus::Running => "running",
            ReconcileStatus::Completed => "completed",
            ReconcileStatus::Partial => "partial",
            ReconcileStatus::Failed => "failed",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "completed" => ReconcileStatus::Completed,
            "partial" => ReconcileStatus::Partial,
            "failed" => ReconcileStatus::Failed,
            _ => ReconcileStatus::Running,
        }
    }
}

/// Result of a reconcile run (also the stored run-log shape)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileResult {
    pub reconcile_id: String,
    pub date: String,
    pub total_in_ledger: usize,
    pub total_in_db: usize,
    pub missing_count: usize,
    pub replayed_count: usize,
    pub failed_count: usize,
    pub status: ReconcileStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileStatusResponse {
    pub date: String,
    pub last_run: Option<ReconcileResult>,
    pub is_consistent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileHistoryResponse {
    pub date: String,
    pub runs: Vec<ReconcileResult>,
}

/// Reconciliation engine
#[derive(Clone)]
pub struct Reconciler {
    db: Database,
    ledger: LedgerStore,
    signals: SignalStore,
    ingest: IngestService,
    audit: AuditLog,
    /// Tenants with a run in flight; at most one run per tenant.
    running: Arc<Mutex<HashSet<String>>>,
}

impl Reconciler {
    pub fn new(
        db: Database,
        ledger: LedgerStore,
        signals: SignalStore,
        ingest: IngestService,
        audit: AuditLog,
    ) -> Self {
        Self {
            db,
            ledger,
            signals,
            ingest,
            audit,
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Run reconciliation for the last `since_days` days.
    pub fn run(&self, tenant_id: &str, since_days: i64) -> Result<ReconcileResult, ApiError> {
        if !self.running.lock().insert(tenant_id.to_string()) {
            return Err(ApiError::conflict(
                "reconcile already running for tenant",
                serde_json::json!({ "error": "reconcile_in_progress" }),
            ));
        }
        let result = self.run_locked(tenant_id, since_days);
        self.running.lock().remove(tenant_id);
        result
    }

    fn run_locked(&self, tenant_id: &str, since_days: i64) -> Result<ReconcileResult, ApiError> {
        let reconcile_id = format!("recon-{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
        let started_at = Utc::now();
        let since = started_at - Duration::days(since_days);
        let target_date = started_at.date_naive();

        info!(
            reconcile_id = %reconcile_id,
            tenant_id = %tenant_id,
            since_days,
            "reconcile started"
        );

        self.open_run_log(&reconcile_id, tenant_id, target_date, started_at)
            .map_err(ApiError::Internal)?;

        let ledger_entries = self
            .ledger
            .entries_since(tenant_id, since)
            .map_err(ApiError::Internal)?;
        let primary_ids = self
            .signals
            .signal_ids_since(tenant_id, since)
            .map_err(ApiError::Internal)?;

        let total_in_ledger = ledger_entries
            .iter()
            .map(|e| e.signal_id.as_str())
            .collect::<HashSet<_>>()
            .len();
        let total_in_db = primary_ids.len();

        let mut missing: Vec<&crate::ledger::LedgerEntry> = ledger_entries
            .iter()
            .filter(|e| !primary_ids.contains(&e.signal_id))
            .collect();
        // Newest entry wins per signal id; entries are ordered oldest-first.
        let mut seen = HashSet::new();
        missing.reverse();
        missing.retain(|e| seen.insert(e.signal_id.clone()));
        let missing_count = missing.len();

        info!(
            reconcile_id = %reconcile_id,
            total_in_ledger,
            total_in_db,
            missing = missing_count,
            "reconcile diff computed"
        );

        let mut replayed = 0usize;
        let mut failed = 0usize;
        for entry in &missing {
            match self
                .ingest
                .replay_from_ledger(tenant_id, &entry.signal_id, &entry.payload)
            {
                Ok((ack, was_new)) => {
                    if was_new {
                        replayed += 1;
                        if let Err(err) = self.ledger.mark_ingested(&entry.id, &ack.ack_id) {
                            debug!(
                                signal_id = %entry.signal_id,
                                error = %err,
                                "ledger status update after replay failed"
                            );
                        }
                    }
                    debug!(signal_id = %entry.signal_id, was_new, "reconcile replay ok");
                }
                Err(err) => {
                    failed += 1;
                    error!(
                        signal_id = %entry.signal_id,
                        error = %err,
                        "reconcile replay failed"
                    );
                }
            }
        }

        let status = if failed == 0 {
            ReconcileStatus::Completed
        } else if replayed > 0 {
            ReconcileStatus::Partial
        } else {
            ReconcileStatus::Failed
        };
        let completed_at = Utc::now();

        self.close_run_log(
            &reconcile_id,
            total_in_ledger,
            total_in_db,
            missing_count,
            replayed,
            failed,
            status,
            completed_at,
        )
        .map_err(ApiError::Internal)?;

        metrics::gauge!(
            "riskcast_reconcile_last_status",
            match status {
                ReconcileStatus::Completed => 0.0,
                ReconcileStatus::Partial => 1.0,
                _ => 2.0,
            }
        );

        info!(
            reconcile_id = %reconcile_id,
            status = status.as_str(),
            missing = missing_count,
            replayed,
            failed,
            "reconcile completed"
        );

        self.audit.record_best_effort(
            AuditEvent::new("reconcile_run")
                .tenant(tenant_id)
                .resource("reconcile", reconcile_id.clone())
                .details(serde_json::json!({
                    "status": status.as_str(),
                    "missing": missing_count,
                    "replayed": replayed,
                    "failed": failed,
                })),
        );

        Ok(ReconcileResult {
            reconcile_id,
            date: target_date.to_string(),
            total_in_ledger,
            total_in_db,
            missing_count,
            replayed_count: replayed,
            failed_count: failed,
            status,
            started_at,
            completed_at: Some(completed_at),
        })
    }

    /// Latest run and consistency verdict for a date.
    pub fn status(&self, tenant_id: &str, date: NaiveDate) -> Result<ReconcileStatusResponse> {
        let conn = self.db.lock();
        let last_run = conn
            .query_row(
                &format!("{SELECT_RUN} WHERE tenant_id = ?1 AND target_date = ?2 ORDER BY started_at DESC LIMIT 1"),
                params![tenant_id, date.to_string()],
                map_run,
            )
            .optional()?;

        let is_consistent = last_run
            .as_ref()
            .map(|run| run.status == ReconcileStatus::Completed && run.missing_count == 0)
            .unwrap_or(false);

        Ok(ReconcileStatusResponse {
            date: date.to_string(),
            last_run,
            is_consistent,
        })
    }

    /// All runs for a date, newest first.
    pub fn history(&self, tenant_id: &str, date: NaiveDate) -> Result<ReconcileHistoryResponse> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_RUN} WHERE tenant_id = ?1 AND target_date = ?2 ORDER BY started_at DESC"
        ))?;
        let runs = stmt
            .query_map(params![tenant_id, date.to_string()], map_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ReconcileHistoryResponse {
            date: date.to_string(),
            runs,
        })
    }

    fn open_run_log(
        &self,
        reconcile_id: &str,
        tenant_id: &str,
        target_date: NaiveDate,
        started_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO reconcile_log (id, reconcile_id, tenant_id, target_date, status, started_at)
             VALUES (?1, ?2, ?3, ?4, 'running', ?5)",
            params![
                uuid::Uuid::new_v4().to_string(),
                reconcile_id,
                tenant_id,
                target_date.to_string(),
                fmt_ts(started_at),
            ],
        )?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn close_run_log(
        &self,
        reconcile_id: &str,
        total_in_ledger: usize,
        total_in_db: usize,
        missing: usize,
        replayed: usize,
        failed: usize,
        status: ReconcileStatus,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.db.lock();
        conn.execute(
            "UPDATE reconcile_log
             SET total_in_ledger = ?2, total_in_db = ?3, missing_count = ?4,
                 replayed_count = ?5, failed_count = ?6, status = ?7, completed_at = ?8
             WHERE reconcile_id = ?1",
            params![
                reconcile_id,
                total_in_ledger as i64,
                total_in_db as i64,
                missing as i64,
                replayed as i64,
                failed as i64,
                status.as_str(),
                fmt_ts(completed_at),
            ],
        )?;
        Ok(())
    }
}

const SELECT_RUN: &str = "SELECT reconcile_id, target_date, total_in_ledger, total_in_db,
        missing_count, replayed_count, failed_count, status, started_at, completed_at
 FROM reconcile_log";

fn map_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReconcileResult> {
    let status_raw: String = row.get(7)?;
    Ok(ReconcileResult {
        reconcile_id: row.get(0)?,
        date: row.get(1)?,
        total_in_ledger: row.get::<_, i64>(2)? as usize,
        total_in_db: row.get::<_, i64>(3)? as usize,
        missing_count: row.get::<_, i64>(4)? as usize,
        replayed_count: row.get::<_, i64>(5)? as usize,
        failed_count: row.get::<_, i64>(6)? as usize,
        status: ReconcileStatus::parse(&status_raw),
        started_at: parse_ts(&row.get::<_, String>(8)?).unwrap_or_else(Utc::now),
        completed_at: row
            .get::<_, Option<String>>(9)?
            .as_deref()
            .and_then(parse_ts),
    })
}
