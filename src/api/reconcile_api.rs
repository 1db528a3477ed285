//! Reconciliation endpoints.

use crate::auth::TenantContext;
use crate::errors::ApiError;
use crate::reconcile::{ReconcileHistoryResponse, ReconcileResult, ReconcileStatusResponse};
use crate::registry::Services;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::Deserialize;

fn default_since_days() -> i64 {
    7
}

#[derive(Debug, Deserialize)]
pub struct ReconcileRunRequest {
    #[serde(default = "default_since_days")]
    pub since_days: i64,
}

fn parse_date(raw: &str) -> Result<NaiveDate, ApiError> {
    raw.parse::<NaiveDate>()
        .map_err(|_| ApiError::validation("target_date", "expected YYYY-MM-DD"))
}

/// POST /reconcile/run
pub async fn run_reconcile(
    State(services): State<Services>,
    Extension(ctx): Extension<TenantContext>,
    Json(body): Json<ReconcileRunRequest>,
) -> Result<Json<ReconcileResult>, ApiError> {
    if !(1..=90).contains(&body.since_days) {
        return Err(ApiError::validation(
            "since_days",
            "must be between 1 and 90",
        ));
    }
    let result = services.reconciler.run(&ctx.tenant_id, body.since_days)?;
    Ok(Json(result))
}

/// GET /reconcile/status/{YYYY-MM-DD}
pub async fn reconcile_status(
    State(services): State<Services>,
    Extension(ctx): Extension<TenantContext>,
    Path(target_date): Path<String>,
) -> Result<Json<ReconcileStatusResponse>, ApiError> {
    let date = parse_date(&target_date)?;
    let status = services
        .reconciler
        .status(&ctx.tenant_id, date)
        .map_err(ApiError::Internal)?;
    Ok(Json(status))
}

/// GET /reconcile/history/{YYYY-MM-DD}
pub async fn reconcile_history(
    State(services): State<Services>,
    Extension(ctx): Extension<TenantContext>,
    Path(target_date): Path<String>,
) -> Result<Json<ReconcileHistoryResponse>, ApiError> {
    let date = parse_date(&target_date)?;
    let history = services
        .reconciler
        .history(&ctx.tenant_id, date)
        .map_err(ApiError::Internal)?;
    Ok(Json(history))
}
