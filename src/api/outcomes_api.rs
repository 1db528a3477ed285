//! Outcome recording, accuracy/ROI reports, and flywheel endpoints.

use crate::auth::TenantContext;
use crate::errors::ApiError;
use crate::outcomes::flywheel::{FlywheelState, LearningSummary};
use crate::outcomes::recorder::{OutcomeRecord, OutcomeRecordRequest, PredictedSnapshot};
use crate::outcomes::{AccuracyReport, RoiReport};
use crate::registry::Services;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RecordOutcomeBody {
    #[serde(flatten)]
    pub request: OutcomeRecordRequest,
    /// The values predicted when the decision was generated.
    pub predicted: PredictedSnapshot,
}

/// POST /outcomes — write-once; re-POST for the same decision_id is 409.
pub async fn record_outcome(
    State(services): State<Services>,
    Extension(ctx): Extension<TenantContext>,
    Json(body): Json<RecordOutcomeBody>,
) -> Result<(StatusCode, Json<OutcomeRecord>), ApiError> {
    if body.request.actual_loss_usd < 0.0 {
        return Err(ApiError::validation(
            "actual_loss_usd",
            "must be non-negative",
        ));
    }
    if !(0.0..=100.0).contains(&body.predicted.risk_score) {
        return Err(ApiError::validation(
            "predicted.risk_score",
            "must be within [0, 100]",
        ));
    }
    let record = services.outcome_recorder.record(
        &ctx.tenant_id,
        &body.request,
        &body.predicted,
        Some(&ctx.actor),
    )?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_list_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_list_limit() -> usize {
    50
}

/// GET /outcomes
pub async fn list_outcomes(
    State(services): State<Services>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<OutcomeRecord>>, ApiError> {
    let records = services
        .outcomes
        .list(&ctx.tenant_id, query.limit.clamp(1, 200), query.offset)
        .map_err(ApiError::Internal)?;
    Ok(Json(records))
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    #[serde(default = "default_days_back")]
    pub days_back: i64,
}

fn default_days_back() -> i64 {
    30
}

/// GET /outcomes/accuracy
pub async fn accuracy_report(
    State(services): State<Services>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<AccuracyReport>, ApiError> {
    let report = services
        .accuracy
        .generate_report(&ctx.tenant_id, query.days_back.clamp(1, 365))
        .map_err(ApiError::Internal)?;
    Ok(Json(report))
}

/// GET /outcomes/roi
pub async fn roi_report(
    State(services): State<Services>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<RoiReport>, ApiError> {
    let report = services
        .roi
        .generate_report(&ctx.tenant_id, query.days_back.clamp(1, 365))
        .map_err(ApiError::Internal)?;
    Ok(Json(report))
}

/// GET /outcomes/flywheel — learning progress summary.
pub async fn flywheel_summary(
    State(services): State<Services>,
    Extension(ctx): Extension<TenantContext>,
) -> Result<Json<LearningSummary>, ApiError> {
    let summary = services
        .flywheel
        .learning_summary(&ctx.tenant_id)
        .map_err(ApiError::Internal)?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
pub struct FlywheelRunQuery {
    #[serde(default = "default_flywheel_days")]
    pub days_back: i64,
}

fn default_flywheel_days() -> i64 {
    90
}

/// POST /outcomes/flywheel/run — compute and apply prior updates for every
/// entity type with outcomes, and refit the calibration scaler from the
/// same outcome window.
pub async fn run_flywheel(
    State(services): State<Services>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<FlywheelRunQuery>,
) -> Result<Json<Vec<FlywheelState>>, ApiError> {
    let days_back = query.days_back.clamp(1, 365);
    let states = services
        .flywheel
        .compute_all_priors(&ctx.tenant_id, days_back)
        .map_err(ApiError::Internal)?;
    for state in &states {
        services
            .flywheel
            .apply(&ctx.tenant_id, state)
            .map_err(ApiError::Internal)?;
    }

    // Refit the Platt scaler; a short history is a no-op inside fit.
    let since = chrono::Utc::now() - chrono::Duration::days(days_back);
    let outcomes = services
        .outcomes
        .fetch_since(&ctx.tenant_id, None, since)
        .map_err(ApiError::Internal)?;
    let predicted: Vec<f64> = outcomes
        .iter()
        .map(|o| o.predicted_risk_score / 100.0)
        .collect();
    let actual: Vec<u8> = outcomes
        .iter()
        .map(|o| u8::from(o.risk_materialized))
        .collect();
    services
        .risk_engine
        .calibration
        .write()
        .fit_scaler(&predicted, &actual);

    Ok(Json(states))
}
