//! Audit trail endpoints.

use crate::audit::{AuditEntry, ChainVerification};
use crate::auth::TenantContext;
use crate::errors::ApiError;
use crate::registry::Services;
use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct AuditTrailResponse {
    pub events: Vec<AuditEntry>,
    pub total: usize,
    pub has_more: bool,
}

/// GET /api/v1/audit-trail — paginated, tenant-scoped.
pub async fn list_audit_trail(
    State(services): State<Services>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditTrailResponse>, ApiError> {
    let limit = query.limit.clamp(1, 200);
    let (events, total) = services
        .audit
        .list(&ctx.tenant_id, query.action.as_deref(), query.offset, limit)
        .map_err(ApiError::Internal)?;
    Ok(Json(AuditTrailResponse {
        has_more: query.offset + limit < total,
        events,
        total,
    }))
}

/// GET /api/v1/audit-trail/integrity — verify the hash chain.
pub async fn check_integrity(
    State(services): State<Services>,
) -> Result<Json<ChainVerification>, ApiError> {
    let report = services.audit.verify_chain().map_err(ApiError::Internal)?;
    Ok(Json(report))
}
