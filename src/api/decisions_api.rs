//! Assessment and decision endpoints.

use crate::auth::TenantContext;
use crate::decisions::{Decision, DecisionList};
use crate::engine::RiskAssessment;
use crate::errors::ApiError;
use crate::registry::Services;
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;

/// GET /api/v1/assessments/{entity_type}/{entity_id}
pub async fn get_assessment(
    State(services): State<Services>,
    Extension(ctx): Extension<TenantContext>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> Result<Json<RiskAssessment>, ApiError> {
    let assessment = services
        .risk_engine
        .assess_entity(&ctx.tenant_id, &entity_type, &entity_id)
        .map_err(ApiError::Internal)?;
    Ok(Json(assessment))
}

#[derive(Debug, Deserialize)]
pub struct GenerateDecisionQuery {
    #[serde(default = "default_entity_type")]
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default)]
    pub exposure_usd: Option<f64>,
}

fn default_entity_type() -> String {
    "order".to_string()
}

/// POST /api/v1/decisions/generate
pub async fn generate_decision(
    State(services): State<Services>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<GenerateDecisionQuery>,
) -> Result<Json<Decision>, ApiError> {
    if let Some(exposure) = query.exposure_usd {
        if exposure < 0.0 {
            return Err(ApiError::validation("exposure_usd", "must be non-negative"));
        }
    }
    let decision = services.decision_engine.generate_decision(
        &ctx.tenant_id,
        &query.entity_type,
        &query.entity_id,
        query.exposure_usd,
    )?;
    Ok(Json(decision))
}

#[derive(Debug, Deserialize)]
pub struct GenerateAllQuery {
    #[serde(default = "default_entity_type")]
    pub entity_type: String,
    #[serde(default = "default_min_severity")]
    pub min_severity: f64,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_min_severity() -> f64 {
    30.0
}

fn default_limit() -> usize {
    20
}

/// POST /api/v1/decisions/generate-all
pub async fn generate_all_decisions(
    State(services): State<Services>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<GenerateAllQuery>,
) -> Result<Json<DecisionList>, ApiError> {
    if !(0.0..=100.0).contains(&query.min_severity) {
        return Err(ApiError::validation(
            "min_severity",
            "must be within [0, 100]",
        ));
    }
    let list = services.decision_engine.generate_for_company(
        &ctx.tenant_id,
        &query.entity_type,
        query.min_severity,
        query.limit.clamp(1, 100),
    )?;
    Ok(Json(list))
}
