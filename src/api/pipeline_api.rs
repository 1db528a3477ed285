//! Pipeline observability endpoints: validation, health, integrity, traces.

use crate::auth::TenantContext;
use crate::errors::ApiError;
use crate::ingest::ValidationResult;
use crate::models::SignalEvent;
use crate::pipeline::health::PipelineHealth;
use crate::pipeline::integrity::IntegrityReport;
use crate::pipeline::trace::{DecisionTrace, PipelineCoverage, TraceChain};
use crate::registry::Services;
use crate::upstream::UpstreamStatus;
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;

fn default_hours_back() -> i64 {
    24
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    #[serde(default = "default_hours_back")]
    pub hours_back: i64,
}

impl WindowQuery {
    fn validated(&self) -> Result<i64, ApiError> {
        if !(1..=168).contains(&self.hours_back) {
            return Err(ApiError::validation(
                "hours_back",
                "must be between 1 and 168",
            ));
        }
        Ok(self.hours_back)
    }
}

/// POST /api/v1/pipeline/validate — pre-flight check without ingesting.
pub async fn validate_signal(Json(event): Json<SignalEvent>) -> Json<ValidationResult> {
    Json(crate::ingest::SignalValidator::new().validate(&event))
}

/// GET /api/v1/pipeline/health
pub async fn pipeline_health(
    State(services): State<Services>,
    Extension(ctx): Extension<TenantContext>,
) -> Result<Json<PipelineHealth>, ApiError> {
    let health = services
        .health_monitor
        .check_health(&ctx.tenant_id)
        .map_err(ApiError::Internal)?;
    Ok(Json(health))
}

/// GET /api/v1/pipeline/integrity
pub async fn integrity_check(
    State(services): State<Services>,
    Extension(ctx): Extension<TenantContext>,
    Query(window): Query<WindowQuery>,
) -> Result<Json<IntegrityReport>, ApiError> {
    let hours = window.validated()?;
    let report = services
        .integrity
        .check_integrity(&ctx.tenant_id, hours)
        .map_err(ApiError::Internal)?;
    Ok(Json(report))
}

/// GET /api/v1/pipeline/integrity/replay
pub async fn signals_needing_replay(
    State(services): State<Services>,
    Extension(ctx): Extension<TenantContext>,
    Query(window): Query<WindowQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let hours = window.validated()?;
    let signal_ids = services
        .integrity
        .find_signals_needing_replay(&ctx.tenant_id, hours)
        .map_err(ApiError::Internal)?;
    Ok(Json(serde_json::json!({
        "signals_needing_replay": signal_ids,
        "count": signal_ids.len(),
        "hours_checked": hours,
    })))
}

/// GET /api/v1/pipeline/trace/{signal_id}
pub async fn trace_signal(
    State(services): State<Services>,
    Extension(ctx): Extension<TenantContext>,
    Path(signal_id): Path<String>,
) -> Result<Json<TraceChain>, ApiError> {
    let chain = services
        .tracer
        .trace_signal(&ctx.tenant_id, &signal_id)
        .map_err(ApiError::Internal)?;
    Ok(Json(chain))
}

/// GET /api/v1/pipeline/trace/decision/{decision_id}
pub async fn trace_decision(
    State(services): State<Services>,
    Extension(ctx): Extension<TenantContext>,
    Path(decision_id): Path<String>,
) -> Result<Json<DecisionTrace>, ApiError> {
    let trace = services
        .tracer
        .trace_decision(&ctx.tenant_id, &decision_id)
        .map_err(ApiError::Internal)?;
    Ok(Json(trace))
}

/// GET /api/v1/pipeline/upstream — probe the producer's health endpoint.
pub async fn upstream_health(State(services): State<Services>) -> Json<UpstreamStatus> {
    Json(services.upstream.check().await)
}

/// GET /api/v1/pipeline/coverage
pub async fn pipeline_coverage(
    State(services): State<Services>,
    Extension(ctx): Extension<TenantContext>,
    Query(window): Query<WindowQuery>,
) -> Result<Json<PipelineCoverage>, ApiError> {
    let hours = window.validated()?;
    let coverage = services
        .tracer
        .pipeline_coverage(&ctx.tenant_id, hours)
        .map_err(ApiError::Internal)?;
    Ok(Json(coverage))
}
