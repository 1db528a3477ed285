//! Best-effort alert dispatch.
//!
//! Alert hooks fire from the ingest path (high-severity signals) and the
//! decision path (escalations). Delivery is decoupled from the business
//! request through a bounded queue and a single worker task, so a slow or
//! crashing sink is observable (metric + log) without failing the request
//! that raised the alert. Channel adapters (email, chat, SMS) are out of
//! scope; the worker terminates in structured logs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSource {
    Ingest,
    Decision,
}

/// An alert raised by a business path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub tenant_id: String,
    pub source: AlertSource,
    pub subject: String,
    pub severity_score: f64,
    pub resource_id: String,
    pub details: serde_json::Value,
    pub raised_at: DateTime<Utc>,
}

/// Delivery target for alerts. Channel adapters (email, chat, SMS) live
/// outside this crate and plug in here.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: &Alert) -> anyhow::Result<()>;
}

/// Default sink: structured logs only.
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn deliver(&self, alert: &Alert) -> anyhow::Result<()> {
        info!(
            tenant_id = %alert.tenant_id,
            source = ?alert.source,
            resource_id = %alert.resource_id,
            severity = alert.severity_score,
            subject = %alert.subject,
            "alert dispatched"
        );
        Ok(())
    }
}

/// Handle used by business paths to enqueue alerts
#[derive(Clone)]
pub struct AlertDispatcher {
    tx: mpsc::Sender<Alert>,
}

impl AlertDispatcher {
    /// Spawn the worker with the default log sink.
    pub fn start(queue_depth: usize) -> Self {
        Self::start_with_sink(queue_depth, Arc::new(LogSink))
    }

    /// Spawn the worker draining into `sink`. A sink failure is counted and
    /// logged; it never reaches the request that raised the alert.
    pub fn start_with_sink(queue_depth: usize, sink: Arc<dyn AlertSink>) -> Self {
        let (tx, mut rx) = mpsc::channel::<Alert>(queue_depth.max(1));
        tokio::spawn(async move {
            while let Some(alert) = rx.recv().await {
                match sink.deliver(&alert).await {
                    Ok(()) => {
                        metrics::counter!("riskcast_alerts_dispatched", 1);
                    }
                    Err(err) => {
                        metrics::counter!("riskcast_alerts_failed", 1);
                        warn!(
                            resource_id = %alert.resource_id,
                            error = %err,
                            "alert delivery failed"
                        );
                    }
                }
            }
        });
        Self { tx }
    }

    /// Enqueue an alert. Never blocks and never fails the caller; a full
    /// queue drops the alert and records the drop.
    pub fn dispatch(&self, alert: Alert) {
        if let Err(err) = self.tx.try_send(alert) {
            metrics::counter!("riskcast_alerts_dropped", 1);
            warn!(error = %err, "alert queue full or closed, alert dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(id: &str) -> Alert {
        Alert {
            tenant_id: "t".to_string(),
            source: AlertSource::Ingest,
            subject: "High-severity signal".to_string(),
            severity_score: 88.0,
            resource_id: id.to_string(),
            details: serde_json::json!({}),
            raised_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_does_not_block_when_queue_full() {
        let dispatcher = AlertDispatcher::start(1);
        // Flood far past the queue depth; the caller must never block or panic.
        for i in 0..100 {
            dispatcher.dispatch(alert(&format!("sig-{i}")));
        }
    }
}
