//! Operational endpoints: health, readiness, Prometheus metrics.

use crate::errors::ApiError;
use crate::registry::Services;
use axum::extract::State;
use axum::Json;
use serde_json::json;

/// GET /health — liveness.
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /ready — readiness: the primary store must answer.
pub async fn ready(State(services): State<Services>) -> Result<Json<serde_json::Value>, ApiError> {
    services
        .db
        .lock()
        .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
        .map_err(|_| ApiError::Dependency("primary store".to_string()))?;
    Ok(Json(json!({ "status": "ready" })))
}

/// GET /metrics — Prometheus text exposition format.
///
/// Ingest counters and ledger depth are rendered directly; everything
/// recorded through the `metrics` crate (reconcile status, freshness
/// gauges, assessment latency histogram) comes from the installed recorder.
pub async fn prometheus_metrics(State(services): State<Services>) -> String {
    let snapshot = services.counters.snapshot();
    let uptime = services.started_at.elapsed().as_secs_f64();
    let ledger_depth = services.ledger.depth().unwrap_or(0);

    let mut out = String::new();
    out.push_str(&format!("riskcast_uptime_seconds {uptime:.1}\n"));
    out.push_str(&format!(
        "riskcast_ingest_received_total {}\n",
        snapshot.total_received
    ));
    out.push_str(&format!(
        "riskcast_ingest_ingested_total {}\n",
        snapshot.total_ingested
    ));
    out.push_str(&format!(
        "riskcast_ingest_duplicates_total {}\n",
        snapshot.total_duplicates
    ));
    out.push_str(&format!(
        "riskcast_ingest_errors_total {}\n",
        snapshot.total_errors
    ));
    out.push_str(&format!(
        "riskcast_ingest_success_rate {:.4}\n",
        snapshot.total_ingested as f64 / snapshot.total_received.max(1) as f64
    ));
    out.push_str(&format!("riskcast_ledger_depth {ledger_depth}\n"));

    if let Some(handle) = &services.prometheus {
        out.push_str(&handle.render());
    }
    out
}
