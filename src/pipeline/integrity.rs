//! Ledger ↔ primary-store integrity checking.
//!
//! The ledger is the source of truth. A signal in the ledger but not in the
//! primary store needs replay; the reverse should never happen and is
//! surfaced, never silently corrected.

use crate::db::SignalStore;
use crate::ledger::{LedgerStatus, LedgerStore};
use crate::models::fmt_ts;
use anyhow::Result;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityIssue {
    pub issue_type: String,
    pub signal_id: String,
    pub description: String,
    pub severity: IssueSeverity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub check_id: String,
    pub checked_at: String,
    pub period_hours: i64,
    pub total_ledger_entries: usize,
    pub total_db_records: usize,
    pub missing_from_db: usize,
    pub orphaned_in_db: usize,
    pub is_consistent: bool,
    pub issues: Vec<IntegrityIssue>,
}

/// Set-diff classifier over a time window
#[derive(Clone)]
pub struct IntegrityChecker {
    ledger: LedgerStore,
    signals: SignalStore,
}

impl IntegrityChecker {
    pub fn new(ledger: LedgerStore, signals: SignalStore) -> Self {
        Self { ledger, signals }
    }

    pub fn check_integrity(&self, tenant_id: &str, hours_back: i64) -> Result<IntegrityReport> {
        let now = Utc::now();
        let check_id = format!("check_{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
        let cutoff = now - Duration::hours(hours_back);
        let mut issues: Vec<IntegrityIssue> = Vec::new();

        let entries = self.ledger.entries_since(tenant_id, cutoff)?;
        let db_ids = self.signals.signal_ids_since(tenant_id, cutoff)?;

        let mut ledger_ids: HashSet<&str> = HashSet::new();
        let mut status_by_id: HashMap<&str, LedgerStatus> = HashMap::new();
        let mut duplicates: HashSet<&str> = HashSet::new();
        for entry in &entries {
            if !ledger_ids.insert(&entry.signal_id) {
                duplicates.insert(&entry.signal_id);
            }
            status_by_id.insert(&entry.signal_id, entry.status);
        }

        let failed_ids: HashSet<&str> = status_by_id
            .iter()
            .filter(|(_, status)| **status == LedgerStatus::Failed)
            .map(|(id, _)| *id)
            .collect();

        // Missing: ledger ∧ ¬primary, excluding explicitly failed entries.
        let mut missing: Vec<&str> = ledger_ids
            .iter()
            .filter(|id| !failed_ids.contains(**id) && !db_ids.contains(**id))
            .copied()
            .collect();
        missing.sort_unstable();
        for sid in &missing {
            issues.push(IntegrityIssue {
                issue_type: "missing_from_db".to_string(),
                signal_id: sid.to_string(),
                description: "signal in ledger but not in primary store, needs replay"
                    .to_string(),
                severity: IssueSeverity::Error,
            });
        }

        // Orphaned: primary ∧ ¬ledger.
        let mut orphaned: Vec<&str> = db_ids
            .iter()
            .map(String::as_str)
            .filter(|id| !ledger_ids.contains(id))
            .collect();
        orphaned.sort_unstable();
        for sid in &orphaned {
            issues.push(IntegrityIssue {
                issue_type: "orphaned_in_db".to_string(),
                signal_id: sid.to_string(),
                description: "signal in primary store but not in ledger".to_string(),
                severity: IssueSeverity::Warning,
            });
        }

        let mut failed_sorted: Vec<&str> = failed_ids.iter().copied().collect();
        failed_sorted.sort_unstable();
        for sid in failed_sorted {
            issues.push(IntegrityIssue {
                issue_type: "ingest_failed".to_string(),
                signal_id: sid.to_string(),
                description: "signal ingest failed, logged in ledger".to_string(),
                severity: IssueSeverity::Warning,
            });
        }

        let mut dup_sorted: Vec<&str> = duplicates.iter().copied().collect();
        dup_sorted.sort_unstable();
        for sid in dup_sorted {
            issues.push(IntegrityIssue {
                issue_type: "duplicate_in_ledger".to_string(),
                signal_id: sid.to_string(),
                description: "signal id appears multiple times in ledger".to_string(),
                severity: IssueSeverity::Info,
            });
        }

        let report = IntegrityReport {
            check_id: check_id.clone(),
            checked_at: fmt_ts(now),
            period_hours: hours_back,
            total_ledger_entries: ledger_ids.len(),
            total_db_records: db_ids.len(),
            missing_from_db: missing.len(),
            orphaned_in_db: orphaned.len(),
            is_consistent: missing.is_empty() && orphaned.is_empty(),
            issues,
        };

        info!(
            check_id = %check_id,
            is_consistent = report.is_consistent,
            missing = report.missing_from_db,
            orphaned = report.orphaned_in_db,
            "integrity check complete"
        );

        Ok(report)
    }

    /// Sorted signal ids in the ledger (status ≠ failed) with no primary row.
    pub fn find_signals_needing_replay(
        &self,
        tenant_id: &str,
        hours_back: i64,
    ) -> Result<Vec<String>> {
        let cutoff = Utc::now() - Duration::hours(hours_back);
        let entries = self.ledger.entries_since(tenant_id, cutoff)?;
        let db_ids = self.signals.signal_ids_since(tenant_id, cutoff)?;

        let mut needing: Vec<String> = entries
            .iter()
            .filter(|e| e.status != LedgerStatus::Failed && !db_ids.contains(&e.signal_id))
            .map(|e| e.signal_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        needing.sort_unstable();
        Ok(needing)
    }
}
